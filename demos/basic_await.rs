//! A coroutine on the main (serial) executor awaits a promise that a worker
//! thread resolves a second later. The main thread is never blocked while
//! the wait is outstanding.

use std::thread;
use std::time::Duration;

use corostack::executor::SerialExecutor;
use corostack::future;

fn main() {
    env_logger::init();

    let main_executor = SerialExecutor::new();
    let (promise, future) = future::pending::<i32>();

    corostack::launch(main_executor.clone(), move || {
        println!("awaiting...");
        let value = future.await_value().expect("promise resolved with an error");
        println!("got {value}");
    });

    thread::spawn(move || {
        thread::sleep(Duration::from_secs(1));
        promise.success(1);
    })
    .join()
    .unwrap();

    main_executor.shutdown();
}
