//! Pattern 2: Completion Tracking
//! mark_done() + join() instead of polling the output length
//!
//! Run with: cargo run --example p2_join_notification

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use queue_pipeline::BoundedQueue;

fn notification() {
    let queue = Arc::new(BoundedQueue::new(4).expect("capacity > 0"));

    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::spawn(move || {
        println!("Consumer: waiting");
        let _work: &str = consumer_queue.get();
        println!("Consumer: working");
        thread::sleep(Duration::from_millis(200));
        println!("Consumer: done");
        consumer_queue.mark_done().unwrap();
    });

    println!("Producer: putting");
    queue.put("work");
    println!("Producer: waiting");
    let start = Instant::now();
    // Returns only after every put() has a matching mark_done().
    queue.join();
    println!("Producer: done after {:?}", start.elapsed());
    consumer.join().unwrap();
}

fn retrieved_is_not_finished() {
    let queue = BoundedQueue::new(2).expect("capacity > 0");
    queue.put(1);
    queue.put(2);
    let _ = queue.get();

    println!("len         = {}", queue.len());
    println!("outstanding = {}", queue.outstanding());
    println!(
        "join_timeout(10ms) = {}",
        queue.join_timeout(Duration::from_millis(10))
    );

    queue.mark_done().unwrap();
    let _ = queue.get();
    queue.mark_done().unwrap();
    println!("after two mark_done: outstanding = {}", queue.outstanding());

    match queue.mark_done() {
        Ok(()) => println!("Unexpected success"),
        Err(e) => println!("one mark_done too many: {}", e),
    }
}

fn main() {
    println!("=== Producer Waits on join() ===\n");
    notification();

    println!("\n=== Retrieved Is Not Finished ===\n");
    retrieved_is_not_finished();

    println!("\n=== Key Points ===");
    println!("1. Every put() increments an outstanding counter");
    println!("2. mark_done() decrements it once the item is fully handled");
    println!("3. join() blocks on a Condvar until the counter hits zero");
    println!("4. No busy-wait loop over the output queue length");
}
