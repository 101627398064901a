//! spec.md §8 scenario S6: reverse scan returns only the maximum key, and
//! any `max` other than 1 (with a bounded upper endpoint) is rejected.

use stratokv::status::{ScanEndpoint, Status};
use stratokv::{Config, Context};

fn new_ctx() -> Context {
    let _ = env_logger::try_init();
    Context::init(Config::default())
}

#[test]
fn reverse_scan_returns_the_maximum_key() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    for k in [b"alpha".as_slice(), b"gamma", b"beta", b"delta"] {
        ctx.put(token, "s", k, b"v", 1, true);
    }

    let (status, entries, _) = ctx.scan("s", &[], ScanEndpoint::Inf, &[], ScanEndpoint::Inf, 1, true);
    assert_eq!(status, Status::Ok);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, b"gamma".to_vec());

    ctx.fin();
}

#[test]
fn reverse_scan_on_empty_storage_returns_nothing() {
    let ctx = new_ctx();
    ctx.create_storage("s");

    let (status, entries, _) = ctx.scan("s", &[], ScanEndpoint::Inf, &[], ScanEndpoint::Inf, 1, true);
    assert_eq!(status, Status::Ok);
    assert!(entries.is_empty());

    ctx.fin();
}

#[test]
fn reverse_scan_requires_max_one_and_unbounded_upper_endpoint() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();
    ctx.put(token, "s", b"a", b"v", 1, true);

    let (status, entries, _) = ctx.scan("s", &[], ScanEndpoint::Inf, &[], ScanEndpoint::Inf, 2, true);
    assert_eq!(status, Status::ErrBadUsage);
    assert!(entries.is_empty());

    let (status, entries, _) = ctx.scan("s", &[], ScanEndpoint::Inf, b"z", ScanEndpoint::Inclusive, 1, true);
    assert_eq!(status, Status::ErrBadUsage);
    assert!(entries.is_empty());

    ctx.fin();
}
