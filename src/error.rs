/// Reasons a request could not be served.
///
/// The public entry points never surface these; every failure becomes a null
/// pointer. They exist so the layers below can say why, and so the reason can
/// be logged.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  #[error("zero-sized request")]
  ZeroSize,
  #[error("{count} * {elem_size} overflows usize")]
  Overflow { count: usize, elem_size: usize },
  #[error("heap refused to grow by {requested} bytes")]
  Exhausted { requested: usize },
  #[error("heap refused to shrink by {requested} bytes")]
  Shrink { requested: usize },
  #[error("no payload could be placed at alignment {align}")]
  Unaligned { align: usize },
}
