//! Pattern 1: Condvar-backed Bounded Queue
//! Replacing a busy-polling worker with blocking waits
//!
//! Run with: cargo run --example p1_condvar_queue

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use queue_pipeline::BoundedQueue;

fn blocking_get() {
    let queue = Arc::new(BoundedQueue::new(3).expect("capacity > 0"));

    // The consumer starts first and simply sleeps inside get() until data arrives.
    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::spawn(move || {
        println!("Consumer: waiting");
        let item: i32 = consumer_queue.get();
        println!("Consumer: got {}", item);
    });

    thread::sleep(Duration::from_millis(100));
    println!("Producer: putting 42");
    queue.put(42);
    consumer.join().unwrap();
}

fn producer_consumer() {
    let queue = Arc::new(BoundedQueue::new(3).expect("capacity > 0"));

    let producer_queue = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        for i in 0..10 {
            println!("Producer: pushing {}", i);
            producer_queue.put(i);
        }
    });

    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::spawn(move || {
        for _ in 0..10 {
            let item = consumer_queue.get();
            println!("Consumer: popped {}", item);
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}

fn non_blocking_variants() {
    let queue = BoundedQueue::new(1).expect("capacity > 0");
    println!("try_get on empty: {:?}", queue.try_get());
    queue.try_put("first").unwrap();
    match queue.try_put("second") {
        Ok(()) => println!("Unexpected success"),
        Err(e) => {
            println!("try_put on full: {}", e);
            println!("item handed back: {:?}", e.into_inner());
        }
    }
    println!(
        "get_timeout after drain: {:?}",
        queue.get_timeout(Duration::from_millis(10))
    );
}

fn main() {
    println!("=== Blocking get() ===\n");
    blocking_get();

    println!("\n=== Producer / Consumer ===\n");
    producer_consumer();

    println!("\n=== Non-blocking Variants ===\n");
    non_blocking_variants();

    println!("\n=== Key Points ===");
    println!("1. get() sleeps on a Condvar instead of polling with sleep()");
    println!("2. put() blocks while full, so memory use is bounded");
    println!("3. try_put/try_get never block; get_timeout bounds the wait");
}
