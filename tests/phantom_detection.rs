//! spec.md §8 property 6 ("Phantom detection") and the first half of
//! scenario S1: an empty-tree scan reports exactly one version stamp (for
//! the absent root), and that stamp changes once the tree gains content.

use stratokv::status::ScanEndpoint;
use stratokv::{Config, Context};

fn new_ctx() -> Context {
    let _ = env_logger::try_init();
    Context::init(Config::default())
}

#[test]
fn empty_storage_scan_reports_a_single_root_version_stamp() {
    let ctx = new_ctx();
    ctx.create_storage("s");

    let (_, entries, versions) = ctx.scan("s", &[], ScanEndpoint::Inf, &[], ScanEndpoint::Inf, 0, false);
    assert!(entries.is_empty());
    assert_eq!(versions.len(), 1);
    assert!(versions[0].border.is_none());

    ctx.fin();
}

#[test]
fn version_stamp_changes_across_put_and_remove() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    let (_, _, before) = ctx.scan("s", &[], ScanEndpoint::Inf, &[], ScanEndpoint::Inf, 0, false);

    ctx.put(token, "s", b"k", b"v", 1, true);
    let (_, _, after_put) = ctx.scan("s", &[], ScanEndpoint::Inf, &[], ScanEndpoint::Inf, 0, false);
    assert_ne!(before[0].version, after_put[0].version);

    ctx.remove(token, "s", b"k");
    ctx.put(token, "s", b"k2", b"v2", 1, true);
    let (_, _, after_second_put) = ctx.scan("s", &[], ScanEndpoint::Inf, &[], ScanEndpoint::Inf, 0, false);
    assert_ne!(after_put[0].version, after_second_put[0].version);

    ctx.fin();
}
