//! Push frames and the subscription registry.

use std::cell::RefCell;
use std::rc::Rc;

use edge_executor::LocalExecutor;
use esprpc::rpc::envelope::{Envelope, PUSH_ID};
use esprpc::service::user::{User, WATCH_USERS};
use esprpc::Value;
use futures_lite::future;

use crate::mock_peer::{fast_config, settle, user, user_transport};

fn recorder() -> (Rc<RefCell<Vec<i32>>>, impl Fn(Value) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let cb = move |v: Value| {
        let user = User::try_from(v).expect("push decodes to a user");
        sink.borrow_mut().push(user.id);
    };
    (seen, cb)
}

#[test]
fn pushes_reach_subscriber_until_unsubscribe() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();
    let (seen, cb) = recorder();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        t.subscribe(WATCH_USERS, cb);
        t.send_stream_request(WATCH_USERS, &[]).unwrap();

        let req = peer.next_request().await;
        assert_eq!(req.method_id, WATCH_USERS);
        assert_eq!(req.correlation_id, PUSH_ID);
        assert!(req.payload.is_empty());
        assert_eq!(t.pending_calls(), 0);

        for id in 1..=3 {
            peer.push(WATCH_USERS, &(&user(id, "w")).into());
        }
        settle().await;
        assert_eq!(*seen.borrow(), [1, 2, 3]);

        assert!(t.unsubscribe(WATCH_USERS));
        peer.push(WATCH_USERS, &(&user(4, "w")).into());
        settle().await;
        assert_eq!(*seen.borrow(), [1, 2, 3]);
    }));
}

#[test]
fn later_subscription_replaces_earlier() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();
    let (first, cb1) = recorder();
    let (second, cb2) = recorder();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        assert!(!t.subscribe(WATCH_USERS, cb1));
        assert!(t.subscribe(WATCH_USERS, cb2));
        peer.push(WATCH_USERS, &(&user(9, "x")).into());
        settle().await;
    }));

    assert!(first.borrow().is_empty());
    assert_eq!(*second.borrow(), [9]);
}

#[test]
fn bad_push_is_dropped_and_stream_continues() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();
    let (seen, cb) = recorder();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);
        t.subscribe(WATCH_USERS, cb);

        peer.deliver(Envelope::new(WATCH_USERS, PUSH_ID, vec![1, 0]));
        peer.push(WATCH_USERS, &(&user(2, "ok")).into());
        settle().await;
        assert_eq!(*seen.borrow(), [2]);
    }));
}

#[test]
fn unsubscribed_push_is_ignored() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);
        peer.push(WATCH_USERS, &(&user(1, "nobody")).into());
        settle().await;
        assert!(t.is_connected());
    }));
}

#[test]
fn subscriptions_survive_reconnect() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();
    let (seen, cb) = recorder();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);
        t.subscribe(WATCH_USERS, cb);

        t.disconnect();
        assert!(t.is_subscribed(WATCH_USERS));

        t.connect().await.unwrap();
        t.spawn(&ex);
        peer.push(WATCH_USERS, &(&user(5, "back")).into());
        settle().await;
    }));

    assert_eq!(*seen.borrow(), [5]);
}
