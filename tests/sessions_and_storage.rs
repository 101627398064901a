//! spec.md §6 facade coverage: session admission/leave, the max-sessions
//! limit, storage create/delete/find, and the `display`/`destroy` debug and
//! teardown entry points.

use stratokv::status::Status;
use stratokv::{Config, Context};

fn new_ctx_with(max_sessions: usize) -> Context {
    let _ = env_logger::try_init();
    Context::init(Config {
        max_sessions,
        ..Config::default()
    })
}

#[test]
fn enter_then_leave_then_reusing_the_token_is_invalid() {
    let ctx = new_ctx_with(4);

    let (status, token) = ctx.enter();
    assert_eq!(status, Status::Ok);
    let token = token.unwrap();

    assert_eq!(ctx.leave(token), Status::Ok);
    assert_eq!(ctx.leave(token), Status::WarnInvalidToken);
    assert_eq!(ctx.put(token, "s", b"k", b"v", 1, true), Status::WarnInvalidToken);

    ctx.fin();
}

#[test]
fn session_table_rejects_admission_past_its_capacity() {
    let ctx = new_ctx_with(2);

    let (s1, t1) = ctx.enter();
    let (s2, t2) = ctx.enter();
    let (s3, t3) = ctx.enter();

    assert_eq!(s1, Status::Ok);
    assert_eq!(s2, Status::Ok);
    assert_eq!(s3, Status::WarnMaxSessions);
    assert!(t3.is_none());

    // Freeing a slot makes room again.
    ctx.leave(t1.unwrap());
    let (s4, t4) = ctx.enter();
    assert_eq!(s4, Status::Ok);
    assert!(t4.is_some());

    ctx.leave(t2.unwrap());
    ctx.leave(t4.unwrap());
    ctx.fin();
}

#[test]
fn create_storage_rejects_duplicates_and_delete_forgets_it() {
    let ctx = new_ctx_with(4);

    assert_eq!(ctx.create_storage("s"), Status::Ok);
    assert_eq!(ctx.create_storage("s"), Status::WarnExist);
    assert_eq!(ctx.find_storage("s"), Status::Ok);

    assert_eq!(ctx.delete_storage("s"), Status::Ok);
    assert_eq!(ctx.find_storage("s"), Status::WarnStorageNotExist);
    assert_eq!(ctx.delete_storage("s"), Status::WarnStorageNotExist);

    ctx.fin();
}

#[test]
fn display_dumps_an_empty_tree_and_destroy_tears_everything_down() {
    let ctx = new_ctx_with(4);
    ctx.create_storage("s");

    let (status, dump) = ctx.display("s");
    assert_eq!(status, Status::Ok);
    assert!(!dump.is_empty());

    let (status, _) = ctx.display("missing");
    assert_eq!(status, Status::WarnStorageNotExist);

    let (_, token) = ctx.enter();
    let token = token.unwrap();
    ctx.put(token, "s", b"k", b"v", 1, true);

    assert_eq!(ctx.destroy(), Status::OkDestroyAll);
    assert_eq!(ctx.find_storage("s"), Status::WarnStorageNotExist);

    ctx.fin();
}
