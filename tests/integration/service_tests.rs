//! Typed UserService facade against a serving peer.

use std::cell::RefCell;
use std::rc::Rc;

use edge_executor::LocalExecutor;
use esprpc::rpc::envelope::PUSH_ID;
use esprpc::service::user::{
    self, CreateUserRequest, User, UserServiceClient, UserStatus,
};
use esprpc::{Error, Value};
use futures_lite::future;

use crate::mock_peer::{Peer, fast_config, response, settle, user, user_transport};

/// Minimal in-memory user store behind the peer.
fn handler(method_id: u8, mut args: Vec<Value>) -> Option<Value> {
    match method_id {
        user::GET_USER => {
            let id = args[0].as_i32()?;
            Some(response(id, "alice"))
        }
        user::CREATE_USER | user::UPDATE_USER => {
            let request = args.pop()?;
            let name = request.get("name")?.as_str()?.to_owned();
            let id = if method_id == user::UPDATE_USER {
                args[0].as_i32()?
            } else {
                42
            };
            Some(response(id, &name))
        }
        user::DELETE_USER => Some(Value::from(args[0].as_i32()? == 1)),
        user::LIST_USERS => {
            let page = args[0].as_i32().unwrap_or(0);
            let users: Vec<Value> = (0..3).map(|i| (&user(page * 10 + i, "u")).into()).collect();
            Some(Value::List(users))
        }
        _ => None,
    }
}

fn with_client(test: impl AsyncFnOnce(&UserServiceClient<'_, esprpc::transport::mem::MemLink>, &Peer)) {
    let (t, peer) = user_transport(fast_config());
    let ex: LocalExecutor<'_, 8> = LocalExecutor::new();

    future::block_on(ex.run(async {
        t.connect().await.unwrap();
        t.spawn(&ex);
        let client = UserServiceClient::new(&t);
        future::or(
            async {
                test(&client, &peer).await;
            },
            async {
                peer.serve(handler).await;
            },
        )
        .await;
    }));
}

#[test]
fn get_create_update_delete() {
    with_client(async |client, _peer| {
        let got = client.get_user(7).await.unwrap();
        assert_eq!(got.id, 7);
        assert_eq!(got.email, "alice@example.com");
        assert_eq!(got.status, UserStatus::Active);

        let req = CreateUserRequest {
            name: "dana".into(),
            email: "dana@example.com".into(),
            password: None,
        };
        let created = client.create_user(&req).await.unwrap();
        assert_eq!((created.id, created.name.as_str()), (42, "dana"));

        let updated = client.update_user(3, &req).await.unwrap();
        assert_eq!(updated.id, 3);

        assert!(client.delete_user(1).await.unwrap());
        assert!(!client.delete_user(2).await.unwrap());
    });
}

#[test]
fn list_users_decodes_every_record() {
    with_client(async |client, _peer| {
        let users = client.list_users(Some(2)).await.unwrap();
        let ids: Vec<i32> = users.iter().map(|u| u.id).collect();
        assert_eq!(ids, [20, 21, 22]);
        assert_eq!(users[0].tags, ["test"]);

        let first_page = client.list_users(None).await.unwrap();
        assert_eq!(first_page[0].id, 0);
    });
}

#[test]
fn fire_and_forget_methods_send_push_frames() {
    let (t, peer) = user_transport(fast_config());
    future::block_on(t.connect()).unwrap();
    let client = UserServiceClient::new(&t);

    client.ping().unwrap();
    client
        .create_user_v2(&CreateUserRequest {
            name: "v2".into(),
            email: "v2@example.com".into(),
            password: Some("secret".into()),
        })
        .unwrap();

    let frames: Vec<_> = peer
        .mem
        .take_written()
        .iter()
        .map(|b| esprpc::rpc::envelope::Envelope::parse(b).unwrap())
        .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!((frames[0].method_id, frames[0].correlation_id), (user::PING, PUSH_ID));
    assert_eq!(frames[1].method_id, user::CREATE_USER_V2);
    assert_eq!(frames[1].correlation_id, PUSH_ID);
    assert_eq!(t.pending_calls(), 0);
}

#[test]
fn watch_users_until_cancelled() {
    let seen: Rc<RefCell<Vec<User>>> = Rc::default();
    let sink = seen.clone();

    with_client(async move |client, peer| {
        let handle = client
            .watch_users(move |u| sink.borrow_mut().push(u))
            .unwrap();

        peer.push(user::WATCH_USERS, &(&user(1, "a")).into());
        peer.push(user::WATCH_USERS, &(&user(2, "b")).into());
        settle().await;

        assert!(handle.cancel());
        peer.push(user::WATCH_USERS, &(&user(3, "c")).into());
        settle().await;
    });

    let ids: Vec<i32> = seen.borrow().iter().map(|u| u.id).collect();
    assert_eq!(ids, [1, 2]);
}

#[test]
fn facade_requires_connection() {
    let (t, _peer) = user_transport(fast_config());
    let client = UserServiceClient::new(&t);

    assert_eq!(
        future::block_on(client.get_user(1)).unwrap_err(),
        Error::NotConnected
    );
    assert!(matches!(client.watch_users(|_| {}), Err(Error::NotConnected)));
    assert!(!t.is_subscribed(user::WATCH_USERS));
}
