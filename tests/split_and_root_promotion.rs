//! spec.md §8 scenarios S2/S3: enough single-byte keys to force border
//! splits and promote a fresh interior root, with range scans still
//! returning exactly the expected slice afterward.

use stratokv::status::{ScanEndpoint, Status};
use stratokv::{Config, Context};

fn new_ctx() -> Context {
    let _ = env_logger::try_init();
    Context::init(Config::default())
}

#[test]
fn enough_keys_to_split_promote_an_interior_root() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    // 15 single-byte keys fit one border (spec.md §4.4 capacity); one more
    // forces a split, and a further run of inserts forces the new root
    // interior node itself to eventually split.
    for i in 0..40u8 {
        assert_eq!(ctx.put(token, "s", &[i], b"v", 1, true), Status::Ok);
    }

    let (status, dump) = ctx.display("s");
    assert_eq!(status, Status::Ok);
    assert!(dump.contains("interior"), "expected a promoted interior root:\n{dump}");

    let (status, entries, _) = ctx.scan("s", &[], ScanEndpoint::Inf, &[], ScanEndpoint::Inf, 0, false);
    assert_eq!(status, Status::Ok);
    assert_eq!(entries.len(), 40);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.key, vec![i as u8]);
    }

    ctx.fin();
}

#[test]
fn every_key_remains_gettable_after_many_splits() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    for i in 0..60u8 {
        ctx.put(token, "s", &[i], format!("v{i}").as_bytes(), 1, true);
    }
    for i in 0..60u8 {
        assert_eq!(
            ctx.get("s", &[i]),
            (Status::Ok, Some(format!("v{i}").into_bytes()))
        );
    }

    ctx.fin();
}
