//! spec.md §8 scenario S5: two threads each insert/remove their own 5 keys
//! in shuffled order, 20 times over; the keys never leave the tree stable
//! in between since the threads overlap, but after both finish a full
//! scan must return exactly the union of both threads' keys, in order.

use stratokv::status::{ScanEndpoint, Status};
use stratokv::{Config, Context};

fn new_ctx() -> Context {
    let _ = env_logger::try_init();
    Context::init(Config::default())
}

fn shuffled(keys: &[&'static [u8]]) -> Vec<&'static [u8]> {
    let mut v = keys.to_vec();
    fastrand::shuffle(&mut v);
    v
}

fn worker(ctx: &Context, keys: &[&'static [u8]]) {
    let (_, token) = ctx.enter();
    let token = token.unwrap();
    for _ in 0..20 {
        for k in shuffled(keys) {
            assert_eq!(ctx.put(token, "s", k, b"v", 1, true), Status::Ok);
        }
        for k in shuffled(keys) {
            assert_eq!(ctx.remove(token, "s", k), Status::Ok);
        }
    }
    for k in keys {
        assert_eq!(ctx.put(token, "s", k, b"v", 1, true), Status::Ok);
    }
    ctx.leave(token);
}

#[test]
fn two_threads_shuffling_their_own_keys_settle_on_the_union() {
    let ctx = new_ctx();
    ctx.create_storage("s");

    let thread_a_keys: &[&[u8]] = &[b"a0", b"a1", b"a2", b"a3", b"a4"];
    let thread_b_keys: &[&[u8]] = &[b"b0", b"b1", b"b2", b"b3", b"b4"];

    std::thread::scope(|scope| {
        let ctx = &ctx;
        scope.spawn(move || worker(ctx, thread_a_keys));
        scope.spawn(move || worker(ctx, thread_b_keys));
    });

    let (status, entries, _) = ctx.scan("s", &[], ScanEndpoint::Inf, &[], ScanEndpoint::Inf, 0, false);
    assert_eq!(status, Status::Ok);

    let mut expected: Vec<Vec<u8>> = thread_a_keys
        .iter()
        .chain(thread_b_keys.iter())
        .map(|k| k.to_vec())
        .collect();
    expected.sort();

    let got: Vec<Vec<u8>> = entries.into_iter().map(|e| e.key).collect();
    assert_eq!(got, expected);

    ctx.fin();
}
