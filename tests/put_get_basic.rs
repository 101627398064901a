//! spec.md §8 property 1 ("Insert/Lookup") and scenario S1.

use stratokv::status::Status;
use stratokv::{Config, Context};

fn new_ctx() -> Context {
    let _ = env_logger::try_init();
    Context::init(Config::default())
}

#[test]
fn insert_then_get_round_trips() {
    let ctx = new_ctx();
    assert_eq!(ctx.create_storage("s"), Status::Ok);
    let (status, token) = ctx.enter();
    assert_eq!(status, Status::Ok);
    let token = token.unwrap();

    assert_eq!(ctx.put(token, "s", b"alpha", b"one", 1, true), Status::Ok);
    assert_eq!(ctx.put(token, "s", b"beta", b"two", 1, true), Status::Ok);
    assert_eq!(ctx.put(token, "s", b"gamma", b"three", 1, true), Status::Ok);

    assert_eq!(ctx.get("s", b"alpha"), (Status::Ok, Some(b"one".to_vec())));
    assert_eq!(ctx.get("s", b"beta"), (Status::Ok, Some(b"two".to_vec())));
    assert_eq!(ctx.get("s", b"gamma"), (Status::Ok, Some(b"three".to_vec())));
    assert_eq!(ctx.get("s", b"delta"), (Status::WarnNotExist, None));

    ctx.leave(token);
    assert_eq!(ctx.fin(), Status::OkDestroyAll);
}

#[test]
fn put_replaces_existing_key_by_default() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    assert_eq!(ctx.put(token, "s", b"k", b"v1", 1, true), Status::Ok);
    assert_eq!(ctx.put(token, "s", b"k", b"v2", 1, true), Status::Ok);
    assert_eq!(ctx.get("s", b"k"), (Status::Ok, Some(b"v2".to_vec())));

    ctx.fin();
}

#[test]
fn put_with_allow_insert_false_rejects_overwrite() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    assert_eq!(ctx.put(token, "s", b"k", b"v1", 1, true), Status::Ok);
    assert_eq!(
        ctx.put(token, "s", b"k", b"v2", 1, false),
        Status::WarnUniqueRestriction
    );
    assert_eq!(ctx.get("s", b"k"), (Status::Ok, Some(b"v1".to_vec())));

    ctx.fin();
}

#[test]
fn operations_against_missing_storage_warn() {
    let ctx = new_ctx();
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    assert_eq!(
        ctx.put(token, "nope", b"k", b"v", 1, true),
        Status::WarnStorageNotExist
    );
    assert_eq!(
        ctx.get("nope", b"k"),
        (Status::WarnStorageNotExist, None)
    );
    assert_eq!(
        ctx.remove(token, "nope", b"k"),
        Status::WarnStorageNotExist
    );

    ctx.fin();
}
