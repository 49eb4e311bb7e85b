//! Request/response correlation through the full transport.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use async_io_mini::Timer;
use edge_executor::LocalExecutor;
use esprpc::service::user::{GET_USER, UserResponse};
use esprpc::{ConnectionState, Error, Value};
use futures_lite::future;

use crate::mock_peer::{fast_config, response, settle, user_transport};

#[test]
fn response_settles_call_and_clears_entry() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        let (result, ()) = future::zip(
            t.call(GET_USER, &[Value::from(1)], Some(Duration::from_millis(2000))),
            async {
                let req = peer.next_request().await;
                assert_eq!(req.method_id, GET_USER);
                assert_eq!(req.correlation_id, 1);
                assert_eq!(peer.args(&req), vec![Value::Int(1)]);
                Timer::after(Duration::from_millis(10)).await;
                peer.reply(&req, &response(1, "alice"));
            },
        )
        .await;

        let user = UserResponse::try_from(result.unwrap()).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.name, "alice");
        assert_eq!(t.pending_calls(), 0);
    }));
}

#[test]
fn unanswered_call_times_out_and_late_response_is_ignored() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        let started = Instant::now();
        let err = t
            .call(GET_USER, &[Value::from(1)], Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(
            err,
            Error::Timeout {
                method_id: GET_USER,
                timeout_ms: 100
            }
        );
        assert!(elapsed >= Duration::from_millis(100), "settled early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1000), "settled late: {elapsed:?}");
        assert_eq!(t.pending_calls(), 0);

        // The response shows up ~50ms after the deadline.
        let stale = peer.next_request().await;
        Timer::after(Duration::from_millis(50)).await;
        peer.reply(&stale, &response(1, "late"));
        settle().await;

        assert!(t.is_connected());
        assert_eq!(t.pending_calls(), 0);

        // A fresh call gets its own id and its own answer.
        let (result, ()) = future::zip(t.call(GET_USER, &[Value::from(2)], None), async {
            let req = peer.next_request().await;
            assert_eq!(req.correlation_id, 2);
            peer.reply(&req, &response(2, "bob"));
        })
        .await;
        assert_eq!(UserResponse::try_from(result.unwrap()).unwrap().name, "bob");
    }));
}

#[test]
fn responses_match_by_id_not_order() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();
    let order = RefCell::new(Vec::new());

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        let a = async {
            let r = t.call(GET_USER, &[Value::from(1)], None).await;
            order.borrow_mut().push("A");
            r
        };
        let b = async {
            let r = t.call(GET_USER, &[Value::from(2)], None).await;
            order.borrow_mut().push("B");
            r
        };
        let responder = async {
            let req_a = peer.next_request().await;
            let req_b = peer.next_request().await;
            peer.reply(&req_b, &response(2, "b"));
            Timer::after(Duration::from_millis(10)).await;
            peer.reply(&req_a, &response(1, "a"));
        };

        let ((ra, rb), ()) = future::zip(future::zip(a, b), responder).await;
        assert_eq!(UserResponse::try_from(ra.unwrap()).unwrap().name, "a");
        assert_eq!(UserResponse::try_from(rb.unwrap()).unwrap().name, "b");
    }));

    assert_eq!(*order.borrow(), ["B", "A"]);
}

#[test]
fn disconnect_fails_pending_and_blocks_new_calls_until_reconnect() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        let (result, ()) = future::zip(t.call(GET_USER, &[Value::from(1)], None), async {
            peer.next_request().await;
            t.disconnect();
        })
        .await;
        assert_eq!(result, Err(Error::Disconnected));
        assert_eq!(t.state(), ConnectionState::Disconnected);
        assert!(!peer.mem.is_open());

        let after = t.call(GET_USER, &[Value::from(1)], None).await;
        assert_eq!(after, Err(Error::NotConnected));

        t.connect().await.unwrap();
        t.spawn(&ex);
        assert_eq!(peer.mem.opens(), 2);

        let (result, ()) = future::zip(t.call(GET_USER, &[Value::from(3)], None), async {
            let req = peer.next_request().await;
            peer.reply(&req, &response(3, "carol"));
        })
        .await;
        assert!(result.is_ok());
    }));
}

#[test]
fn unexpected_close_fails_pending_calls() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        let (result, ()) = future::zip(t.call(GET_USER, &[Value::from(1)], None), async {
            peer.next_request().await;
            peer.mem.close("connection reset", Some(1006));
        })
        .await;

        assert_eq!(result, Err(Error::Disconnected));
        assert_eq!(t.state(), ConnectionState::Disconnected);
        assert_eq!(t.pending_calls(), 0);
    }));
}

#[test]
fn dropped_call_is_forgotten() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        let abandoned = future::or(t.call(GET_USER, &[Value::from(1)], None), async {
            Timer::after(Duration::from_millis(20)).await;
            Ok(Value::Null)
        })
        .await;
        assert_eq!(abandoned, Ok(Value::Null));
        assert_eq!(t.pending_calls(), 0);

        let req = peer.next_request().await;
        peer.reply(&req, &response(1, "nobody"));
        settle().await;
        assert!(t.is_connected());
    }));
}

#[test]
fn malformed_units_are_dropped_without_affecting_calls() {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);

        let (result, ()) = future::zip(t.call(GET_USER, &[Value::from(5)], None), async {
            let req = peer.next_request().await;
            peer.mem.deliver(vec![GET_USER, 1]); // shorter than a header
            peer.mem.deliver(vec![GET_USER, 1, 0, 50, 0, 1]); // declares 50, has 1
            peer.mem.deliver(vec![GET_USER, 1, 0, 1, 0, 0xFF]); // undecodable payload
            peer.reply(&req, &response(5, "eve"));
        })
        .await;

        assert_eq!(UserResponse::try_from(result.unwrap()).unwrap().name, "eve");
    }));
}

#[test]
fn connect_reports_close_reason() {
    let (t, peer) = user_transport(fast_config());
    peer.mem.set_auto_ready(false);
    peer.mem.error("socket error");
    peer.mem.close("server going away", Some(1001));

    let err = future::block_on(t.connect()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "connection failed: server going away (code 1001)"
    );
    assert_eq!(t.state(), ConnectionState::Disconnected);
}
