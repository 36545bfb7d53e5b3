//! Runs ordinary std code, the test harness included, on top of an
//! `Allocator<Brk>` installed as the global allocator.

use std::{collections::HashMap, sync::mpsc, thread};

use sbrkalloc::{Allocator, BLOCK_ALIGN, Brk};

#[global_allocator]
static ALLOCATOR: Allocator<Brk> = Allocator::new(Brk::new());

#[repr(align(128))]
struct Wide([u8; 128]);

#[test]
fn test_std_collections_and_threads() {
  let mut numbers: Vec<u64> = Vec::new();
  for i in 0..1000 {
    numbers.push(i);
  }
  assert_eq!(numbers.iter().sum::<u64>(), 499_500);

  let mut words = HashMap::new();
  for i in 0..100 {
    words.insert(format!("key-{i}"), i);
  }
  assert_eq!(words.len(), 100);
  assert_eq!(words["key-42"], 42);

  let handle = thread::spawn(|| (1..=10).map(|i| vec![i; i]).collect::<Vec<_>>());
  let nested = handle.join().unwrap();
  assert_eq!(nested.iter().map(Vec::len).sum::<usize>(), 55);

  let (sender, receiver) = mpsc::channel::<u32>();
  let senders: Vec<_> = (0..4)
    .map(|t| {
      let sender = sender.clone();
      thread::spawn(move || {
        for i in 0..100 {
          sender.send(t * 100 + i).unwrap();
        }
      })
    })
    .collect();
  drop(sender);

  for sender in senders {
    sender.join().unwrap();
  }
  assert_eq!(receiver.iter().map(u64::from).sum::<u64>(), (0..400).sum());
}

#[test]
fn test_over_aligned_boxes() {
  let mut boxes: Vec<Box<Wide>> = (0..16).map(|i| Box::new(Wide([i as u8; 128]))).collect();

  for (i, wide) in boxes.iter().enumerate() {
    assert_eq!(&**wide as *const Wide as usize % 128, 0);
    assert!(wide.0.iter().all(|&byte| byte == i as u8));
  }

  let mut wides: Vec<Wide> = Vec::with_capacity(1);
  for i in 0..32 {
    wides.push(Wide([i; 128]));
    assert_eq!(wides.as_ptr() as usize % 128, 0);
  }
  assert!(wides.iter().enumerate().all(|(i, wide)| wide.0[127] == i as u8));

  let kept = boxes.pop().unwrap();
  drop(boxes);

  let target = &*kept as *const Wide as *mut u8;
  let mut found = false;
  let mut ordered = true;
  let mut aligned = true;
  let mut previous = 0;

  // No allocation may happen while the registry is being walked.
  ALLOCATOR.for_each_block(|info| {
    found |= info.payload == target && !info.is_free && info.size == 128;
    ordered &= info.block.get() > previous;
    aligned &= info.payload as usize % BLOCK_ALIGN == 0;
    previous = info.block.get();
  });

  assert!(found);
  assert!(ordered);
  assert!(aligned);
}
