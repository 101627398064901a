//! spec.md §8 property 2 ("Remove") and the Open Question's resolution
//! (remove of an absent key, in an existing storage, is `OK_NOT_FOUND`).

use stratokv::status::Status;
use stratokv::{Config, Context};

fn new_ctx() -> Context {
    let _ = env_logger::try_init();
    Context::init(Config::default())
}

#[test]
fn remove_then_get_reports_not_exist() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    ctx.put(token, "s", b"k", b"v", 1, true);
    assert_eq!(ctx.remove(token, "s", b"k"), Status::Ok);
    assert_eq!(ctx.get("s", b"k"), (Status::WarnNotExist, None));

    // A fresh put brings it back.
    ctx.put(token, "s", b"k", b"v2", 1, true);
    assert_eq!(ctx.get("s", b"k"), (Status::Ok, Some(b"v2".to_vec())));

    ctx.fin();
}

#[test]
fn remove_of_absent_key_is_ok_not_found() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    assert_eq!(ctx.remove(token, "s", b"never-inserted"), Status::OkNotFound);
    assert_eq!(ctx.remove(token, "s", b""), Status::OkNotFound);

    ctx.fin();
}

#[test]
fn remove_every_key_leaves_an_empty_tree() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    for i in 0..20u8 {
        ctx.put(token, "s", &[i], b"v", 1, true);
    }
    for i in 0..20u8 {
        assert_eq!(ctx.remove(token, "s", &[i]), Status::Ok);
    }

    let (status, entries, _) = ctx.scan(
        "s",
        &[],
        stratokv::status::ScanEndpoint::Inf,
        &[],
        stratokv::status::ScanEndpoint::Inf,
        0,
        false,
    );
    assert_eq!(status, Status::Ok);
    assert!(entries.is_empty());

    ctx.fin();
}
