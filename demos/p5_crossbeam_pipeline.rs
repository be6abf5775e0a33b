//! Pattern 5: The Same Pipeline over Crossbeam Channels
//! Disconnection replaces the sentinel
//!
//! Run with: cargo run --example p5_crossbeam_pipeline

use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::thread;

fn start_stage<'scope, 'env>(
    scope: &'scope thread::Scope<'env>,
    name: &'static str,
    workers: usize,
    input: Receiver<usize>,
    output: Sender<usize>,
    transform: fn(usize) -> usize,
) {
    for id in 0..workers {
        let input = input.clone();
        let output = output.clone();
        scope.spawn(move |_| {
            let mut processed = 0;
            // recv() fails once every sender is gone and the channel is empty.
            for item in input.iter() {
                output.send(transform(item)).unwrap();
                processed += 1;
            }
            println!("  {}-{} processed {}", name, id, processed);
        });
    }
    // The originals drop here; only the workers keep the channels open.
}

fn crossbeam_pipeline() {
    let (download_tx, download_rx) = bounded(100);
    let (resize_tx, resize_rx) = bounded(100);
    let (upload_tx, upload_rx) = bounded(100);
    let (done_tx, done_rx) = bounded(1000);

    thread::scope(|scope| {
        start_stage(scope, "download", 3, download_rx, resize_tx, |x| x);
        start_stage(scope, "resize", 4, resize_rx, upload_tx, |x| x);
        start_stage(scope, "upload", 5, upload_rx, done_tx, |x| x);

        for i in 0..1000 {
            download_tx.send(i).unwrap();
        }
        // Dropping the last producer handle is the shutdown signal.
        drop(download_tx);
    })
    .unwrap();

    println!("{} items finished", done_rx.len());
}

fn main() {
    println!("=== Crossbeam Channel Pipeline ===\n");
    crossbeam_pipeline();

    println!("\n=== Key Points ===");
    println!("1. A channel disconnects when its last Sender drops");
    println!("2. Stage shutdown cascades without explicit markers");
    println!("3. There is no join(): completion is implied by disconnection");
    println!("4. The sentinel queue makes the drain order explicit instead");
}
