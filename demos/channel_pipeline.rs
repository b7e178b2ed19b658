//! One coroutine feeds a channel with `maxBufferSize = 1`, closes it, and a
//! second coroutine drains it with the channel's blocking iterator.

use std::sync::mpsc;

use corostack::channel::Channel;
use corostack::executor::ThreadPoolExecutor;

fn main() {
    env_logger::init();

    let pool = ThreadPoolExecutor::new();
    let channel = Channel::<u32>::new(1);

    let sender = channel.clone();
    corostack::launch(pool.clone(), move || {
        for i in 0..100 {
            sender.await_send(i).expect("channel closed early");
        }
        sender.close();
    });

    let receiver = channel.clone();
    let done = corostack::launch(pool.clone(), move || {
        let received: Vec<u32> = receiver.iter().collect();
        println!("received {} elements", received.len());
        received
    });

    let (tx, rx) = mpsc::channel();
    done.when_complete(move |result| {
        let _ = tx.send(result);
    });
    let received = rx.recv().unwrap().expect("receiver coroutine failed");
    assert_eq!(received, (0..100).collect::<Vec<_>>());

    pool.shutdown();
}
