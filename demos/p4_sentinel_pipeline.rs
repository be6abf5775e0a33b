//! Pattern 4: Sentinel Shutdown
//! download -> resize -> upload, first by hand, then with worker pools
//!
//! Run with: cargo run --example p4_sentinel_pipeline

use std::sync::Arc;

use queue_pipeline::{BoundedQueue, Pipeline, WorkQueue, Worker};

#[derive(Debug)]
struct Photo(usize);

fn download(photo: Photo) -> Photo {
    photo
}

fn resize(photo: Photo) -> Photo {
    photo
}

fn upload(photo: Photo) -> Photo {
    photo
}

fn one_worker_per_stage() {
    let download_queue: WorkQueue<Photo> = Arc::new(BoundedQueue::new(100).expect("capacity > 0"));
    let resize_queue: WorkQueue<Photo> = Arc::new(BoundedQueue::new(100).expect("capacity > 0"));
    let upload_queue: WorkQueue<Photo> = Arc::new(BoundedQueue::new(100).expect("capacity > 0"));
    let done_queue: WorkQueue<Photo> = Arc::new(BoundedQueue::unbounded());

    let workers = vec![
        Worker::new("download", Arc::new(download), download_queue.clone(), resize_queue.clone()),
        Worker::new("resize", Arc::new(resize), resize_queue.clone(), upload_queue.clone()),
        Worker::new("upload", Arc::new(upload), upload_queue.clone(), done_queue.clone()),
    ];
    let handles: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.spawn().expect("spawn worker"))
        .collect();

    for i in 0..1000 {
        download_queue.put_item(Photo(i));
    }

    // Close each stage only after the one before it has fully drained.
    download_queue.close();
    download_queue.join();
    resize_queue.close();
    resize_queue.join();
    upload_queue.close();
    upload_queue.join();
    println!("{} items finished", done_queue.len());

    for handle in handles {
        let stats = handle.join().unwrap();
        println!("  worker processed {} items in {} polls", stats.processed, stats.polled);
    }
}

fn worker_pools() {
    let mut pipeline = Pipeline::builder()
        .capacity(100)
        .stage("download", 3, download)
        .stage("resize", 4, resize)
        .stage("upload", 5, upload)
        .build()
        .expect("valid pipeline");

    pipeline
        .submit((0..1000).map(Photo))
        .expect("pipeline is running");

    // One sentinel per worker, stage by stage.
    let report = pipeline.shutdown_and_drain().expect("pipeline drains");
    for stage in &report.stages {
        println!(
            "  {:<8} {} workers, {} items, {} polls",
            stage.name, stage.workers, stage.processed, stage.polled
        );
    }
    println!("{} items finished", report.processed());
    println!("first out: {:?}", report.outputs.first());
}

fn main() {
    println!("=== One Worker per Stage ===\n");
    one_worker_per_stage();

    println!("\n=== Worker Pools (3 / 4 / 5) ===\n");
    worker_pools();

    println!("\n=== Key Points ===");
    println!("1. A sentinel in the data stream ends a worker's loop");
    println!("2. Send one sentinel per worker sharing the queue");
    println!("3. join() a stage before closing the next one");
    println!("4. Polls == items + workers: no wasted wakeups");
}
