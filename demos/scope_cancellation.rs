//! A `CoScope` holding several in-flight futures; canceling the scope
//! cancels every future still pending, and completed ones are unaffected.

use std::sync::mpsc;

use corostack::future;
use corostack::scope::CoScope;

fn main() {
    env_logger::init();

    let scope = CoScope::new();
    let mut futures = Vec::new();
    let mut promises = Vec::new();

    for _ in 0..5 {
        let (promise, future) = future::pending::<&'static str>();
        scope.add(std::sync::Arc::new(future.clone()));
        promises.push(promise);
        futures.push(future);
    }

    // Resolve one before canceling; the scope must leave it alone.
    promises[0].success("finished before cancel");

    let (tx, rx) = mpsc::channel();
    for future in &futures {
        let tx = tx.clone();
        future.when_complete(move |result| {
            let _ = tx.send(result);
        });
    }
    drop(tx);

    scope.cancel();

    let mut results: Vec<_> = rx.iter().collect();
    results.sort_by_key(|r| r.is_err());
    println!("{results:?}");
}
