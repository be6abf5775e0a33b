//! Pattern 3: Backpressure
//! A capacity-1 queue makes a fast producer wait for a slow consumer
//!
//! Run with: cargo run --example p3_bounded_backpressure

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use queue_pipeline::BoundedQueue;

fn capacity_one() {
    let queue = Arc::new(BoundedQueue::new(1).expect("capacity > 0"));
    let start = Instant::now();

    // A consumer that waits before draining anything.
    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let _: u32 = consumer_queue.get();
        println!("[{:>4} ms] Consumer got 1", start.elapsed().as_millis());
        let _: u32 = consumer_queue.get();
        println!("[{:>4} ms] Consumer got 2", start.elapsed().as_millis());
        println!("[{:>4} ms] Consumer done", start.elapsed().as_millis());
    });

    queue.put(1);
    println!("[{:>4} ms] Producer put 1", start.elapsed().as_millis());
    queue.put(2); // blocks until the consumer frees the only slot
    println!("[{:>4} ms] Producer put 2", start.elapsed().as_millis());
    println!("[{:>4} ms] Producer done", start.elapsed().as_millis());
    consumer.join().unwrap();
}

fn main() {
    println!("=== Capacity-1 Queue ===\n");
    capacity_one();

    println!("\n=== Key Points ===");
    println!("1. put() on a full queue blocks the producer");
    println!("2. The producer can never run more than `capacity` items ahead");
    println!("3. Blocking is the only backpressure: nothing is dropped");
}
