//! spec.md §8 scenario S4: two keys sharing more than 8 bytes of prefix
//! force a slot collision on the first 8-byte key slice, promoting that
//! slot to a next-layer root. Both keys must remain independently gettable,
//! and removing one must leave the other untouched.

use stratokv::status::Status;
use stratokv::{Config, Context};

fn new_ctx() -> Context {
    let _ = env_logger::try_init();
    Context::init(Config::default())
}

const KEY_A: &[u8] = b"aaaaaaaaa1";
const KEY_B: &[u8] = b"aaaaaaaaa2";

#[test]
fn colliding_keys_promote_and_both_remain_gettable() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    assert_eq!(ctx.put(token, "s", KEY_A, b"va", 1, true), Status::Ok);
    assert_eq!(ctx.put(token, "s", KEY_B, b"vb", 1, true), Status::Ok);

    assert_eq!(ctx.get("s", KEY_A), (Status::Ok, Some(b"va".to_vec())));
    assert_eq!(ctx.get("s", KEY_B), (Status::Ok, Some(b"vb".to_vec())));

    ctx.fin();
}

#[test]
fn removing_one_promoted_key_leaves_the_other() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    ctx.put(token, "s", KEY_A, b"va", 1, true);
    ctx.put(token, "s", KEY_B, b"vb", 1, true);

    assert_eq!(ctx.remove(token, "s", KEY_A), Status::Ok);
    assert_eq!(ctx.get("s", KEY_A), (Status::WarnNotExist, None));
    assert_eq!(ctx.get("s", KEY_B), (Status::Ok, Some(b"vb".to_vec())));

    assert_eq!(ctx.remove(token, "s", KEY_B), Status::Ok);
    assert_eq!(ctx.get("s", KEY_B), (Status::WarnNotExist, None));

    ctx.fin();
}

#[test]
fn three_way_collision_supports_a_third_distinguishing_byte() {
    let ctx = new_ctx();
    ctx.create_storage("s");
    let (_, token) = ctx.enter();
    let token = token.unwrap();

    ctx.put(token, "s", b"aaaaaaaaa1", b"v1", 1, true);
    ctx.put(token, "s", b"aaaaaaaaa2", b"v2", 1, true);
    ctx.put(token, "s", b"aaaaaaaaa3", b"v3", 1, true);

    assert_eq!(ctx.get("s", b"aaaaaaaaa1"), (Status::Ok, Some(b"v1".to_vec())));
    assert_eq!(ctx.get("s", b"aaaaaaaaa2"), (Status::Ok, Some(b"v2".to_vec())));
    assert_eq!(ctx.get("s", b"aaaaaaaaa3"), (Status::Ok, Some(b"v3".to_vec())));

    ctx.fin();
}
