//! `UserService`: typed client for the demo user store.
//!
//! | Id | Method       | Result          | Dispatch                 |
//! |----|--------------|-----------------|--------------------------|
//! | 0  | GetUser      | UserResponse    | call                     |
//! | 1  | CreateUser   | UserResponse    | call                     |
//! | 2  | CreateUserV2 | void            | fire-and-forget          |
//! | 3  | UpdateUser   | UserResponse    | call                     |
//! | 4  | DeleteUser   | bool            | call                     |
//! | 5  | ListUsers    | list<User>      | call (5000 ms default)   |
//! | 6  | WatchUsers   | stream<User>    | subscribe + stream req   |
//! | 7  | Ping         | void            | fire-and-forget          |

use std::time::Duration;

use log::warn;

use crate::error::{CodecError, Result};
use crate::rpc::schema::{Field, FieldType, MethodSchema, Schema};
use crate::rpc::value::Value;
use crate::transport::{Link, RpcTransport};

use super::{take_i32, take_opt_string, take_string, take_strings};

// ── Method ids ───────────────────────────────────────────────

pub const GET_USER: u8 = 0;
pub const CREATE_USER: u8 = 1;
pub const CREATE_USER_V2: u8 = 2;
pub const UPDATE_USER: u8 = 3;
pub const DELETE_USER: u8 = 4;
pub const LIST_USERS: u8 = 5;
pub const WATCH_USERS: u8 = 6;
pub const PING: u8 = 7;

const LIST_USERS_TIMEOUT: Duration = Duration::from_millis(5000);

// ── Types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum UserStatus {
    Active = 1,
    Inactive = 2,
    Deleted = 3,
}

impl TryFrom<i32> for UserStatus {
    type Error = CodecError;

    fn try_from(v: i32) -> core::result::Result<Self, CodecError> {
        match v {
            1 => Ok(Self::Active),
            2 => Ok(Self::Inactive),
            3 => Ok(Self::Deleted),
            _ => Err(CodecError::TypeMismatch {
                field: "status".into(),
                expected: "UserStatus",
            }),
        }
    }
}

impl From<UserStatus> for Value {
    fn from(s: UserStatus) -> Self {
        Value::from(s as i32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub status: UserStatus,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserResponse {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub status: UserStatus,
}

impl TryFrom<Value> for User {
    type Error = CodecError;

    fn try_from(mut v: Value) -> core::result::Result<Self, CodecError> {
        Ok(Self {
            id: take_i32(&mut v, "id")?,
            name: take_string(&mut v, "name")?,
            email: take_opt_string(&mut v, "email")?,
            status: UserStatus::try_from(take_i32(&mut v, "status")?)?,
            tags: take_strings(&mut v, "tags")?,
        })
    }
}

impl TryFrom<Value> for UserResponse {
    type Error = CodecError;

    fn try_from(mut v: Value) -> core::result::Result<Self, CodecError> {
        Ok(Self {
            id: take_i32(&mut v, "id")?,
            name: take_string(&mut v, "name")?,
            email: take_string(&mut v, "email")?,
            status: UserStatus::try_from(take_i32(&mut v, "status")?)?,
        })
    }
}

impl From<&CreateUserRequest> for Value {
    fn from(r: &CreateUserRequest) -> Self {
        Value::record([
            ("name", Value::from(r.name.as_str())),
            ("email", Value::from(r.email.as_str())),
            ("password", Value::from(r.password.clone())),
        ])
    }
}

impl From<&User> for Value {
    fn from(u: &User) -> Self {
        Value::record([
            ("id", Value::from(u.id)),
            ("name", Value::from(u.name.as_str())),
            ("email", Value::from(u.email.clone())),
            ("status", Value::from(u.status)),
            ("tags", Value::from(u.tags.clone())),
        ])
    }
}

impl From<&UserResponse> for Value {
    fn from(u: &UserResponse) -> Self {
        Value::record([
            ("id", Value::from(u.id)),
            ("name", Value::from(u.name.as_str())),
            ("email", Value::from(u.email.as_str())),
            ("status", Value::from(u.status)),
        ])
    }
}

// ── Schema ───────────────────────────────────────────────────

fn user_type() -> FieldType {
    FieldType::Struct(vec![
        Field::new("id", FieldType::I32),
        Field::new("name", FieldType::Str),
        Field::new("email", FieldType::optional(FieldType::Str)),
        Field::new("status", FieldType::Enum),
        Field::new("tags", FieldType::list(FieldType::Str)),
    ])
}

fn create_request_type() -> FieldType {
    FieldType::Struct(vec![
        Field::new("name", FieldType::Str),
        Field::new("email", FieldType::Str),
        Field::new("password", FieldType::optional(FieldType::Str)),
    ])
}

fn user_response_type() -> FieldType {
    FieldType::Struct(vec![
        Field::new("id", FieldType::I32),
        Field::new("name", FieldType::Str),
        Field::new("email", FieldType::Str),
        Field::new("status", FieldType::Enum),
    ])
}

/// Method table shared by the client and any peer implementation.
pub fn schema() -> Schema {
    Schema::new()
        .method(
            MethodSchema::unary(GET_USER, "GetUser")
                .param("id", FieldType::I32)
                .returns(user_response_type()),
        )
        .method(
            MethodSchema::unary(CREATE_USER, "CreateUser")
                .param("request", create_request_type())
                .returns(user_response_type()),
        )
        .method(
            MethodSchema::unary(CREATE_USER_V2, "CreateUserV2")
                .param("request", create_request_type()),
        )
        .method(
            MethodSchema::unary(UPDATE_USER, "UpdateUser")
                .param("id", FieldType::I32)
                .param("request", create_request_type())
                .returns(user_response_type()),
        )
        .method(
            MethodSchema::unary(DELETE_USER, "DeleteUser")
                .param("id", FieldType::I32)
                .returns(FieldType::Bool),
        )
        .method(
            MethodSchema::unary(LIST_USERS, "ListUsers")
                .param("page", FieldType::optional(FieldType::I32))
                .returns(FieldType::list(user_type()))
                .timeout(LIST_USERS_TIMEOUT),
        )
        .method(MethodSchema::stream(WATCH_USERS, "WatchUsers").returns(user_type()))
        .method(MethodSchema::unary(PING, "Ping"))
}

// ── Client ───────────────────────────────────────────────────

pub struct UserServiceClient<'a, L: Link> {
    transport: &'a RpcTransport<L>,
}

impl<'a, L: Link> UserServiceClient<'a, L> {
    /// The transport's codec must be built from [`schema()`].
    pub fn new(transport: &'a RpcTransport<L>) -> Self {
        Self { transport }
    }

    pub async fn get_user(&self, id: i32) -> Result<UserResponse> {
        let v = self.transport.call(GET_USER, &[id.into()], None).await?;
        Ok(UserResponse::try_from(v)?)
    }

    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<UserResponse> {
        let v = self
            .transport
            .call(CREATE_USER, &[request.into()], None)
            .await?;
        Ok(UserResponse::try_from(v)?)
    }

    /// Fire-and-forget create; no response is awaited.
    pub fn create_user_v2(&self, request: &CreateUserRequest) -> Result<()> {
        self.transport
            .send_stream_request(CREATE_USER_V2, &[request.into()])
    }

    pub async fn update_user(&self, id: i32, request: &CreateUserRequest) -> Result<UserResponse> {
        let v = self
            .transport
            .call(UPDATE_USER, &[id.into(), request.into()], None)
            .await?;
        Ok(UserResponse::try_from(v)?)
    }

    pub async fn delete_user(&self, id: i32) -> Result<bool> {
        let v = self.transport.call(DELETE_USER, &[id.into()], None).await?;
        v.as_bool().ok_or_else(|| {
            CodecError::TypeMismatch {
                field: "DeleteUser".into(),
                expected: "bool",
            }
            .into()
        })
    }

    pub async fn list_users(&self, page: Option<i32>) -> Result<Vec<User>> {
        let v = self.transport.call(LIST_USERS, &[page.into()], None).await?;
        let items = v.into_list().ok_or_else(|| CodecError::TypeMismatch {
            field: "ListUsers".into(),
            expected: "list",
        })?;
        Ok(items
            .into_iter()
            .map(User::try_from)
            .collect::<core::result::Result<Vec<_>, CodecError>>()?)
    }

    /// Subscribe to user pushes and ask the peer to start streaming.
    ///
    /// Pushes that do not convert to a [`User`] are logged and skipped.
    pub fn watch_users(&self, on_user: impl Fn(User) + 'static) -> Result<WatchHandle<'a, L>> {
        self.transport.subscribe(WATCH_USERS, move |v| match User::try_from(v) {
            Ok(user) => on_user(user),
            Err(e) => warn!("UserService: dropping WatchUsers push: {}", e),
        });
        if let Err(e) = self.transport.send_stream_request(WATCH_USERS, &[]) {
            self.transport.unsubscribe(WATCH_USERS);
            return Err(e);
        }
        Ok(WatchHandle {
            transport: self.transport,
        })
    }

    /// Fire-and-forget liveness ping.
    pub fn ping(&self) -> Result<()> {
        self.transport.send_stream_request(PING, &[])
    }
}

/// Active `WatchUsers` subscription.
#[must_use = "the subscription stays active until cancel() is called"]
pub struct WatchHandle<'a, L: Link> {
    transport: &'a RpcTransport<L>,
}

impl<L: Link> WatchHandle<'_, L> {
    /// Stop delivering pushes.  Returns `false` if the subscription had
    /// already been replaced or removed.
    pub fn cancel(self) -> bool {
        self.transport.unsubscribe(WATCH_USERS)
    }
}

// ── Tests ────────────────────────────────────────────────────
