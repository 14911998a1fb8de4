//! Greeter demo: greetings and a small in-memory user directory served
//! through the causeway REST gateway.

use causeway_core::{ErrorCode, ProcedureError, Schema};
use causeway_rest_gateway::{
    Gateway, GatewayConfig, GatewayResult, HeaderParam, HttpMethod, ProcedureDescriptor,
    ProcedureGroup, ResponseMeta,
};
use http::header::AUTHORIZATION;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Per-request context
#[derive(Debug, Clone)]
pub struct GreeterContext {
    pub store: Arc<UserStore>,
    /// Caller named by `Authorization: Bearer <name>`
    pub caller: Option<String>,
}

impl GreeterContext {
    fn require_caller(&self) -> Result<&str, ProcedureError> {
        self.caller
            .as_deref()
            .ok_or_else(|| ProcedureError::new(ErrorCode::Unauthorized, "Missing bearer token"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// In-memory user directory
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<Vec<User>>,
    next_id: AtomicU64,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self, limit: Option<usize>) -> Vec<User> {
        let users = self.users.read().await;
        users.iter().take(limit.unwrap_or(usize::MAX)).cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<User> {
        self.users.read().await.iter().find(|u| u.id == id).cloned()
    }

    pub async fn create(&self, name: String, email: String) -> Result<User, ProcedureError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&email)) {
            return Err(ProcedureError::new(
                ErrorCode::Conflict,
                format!("Email {} is already registered", email),
            ));
        }
        let id = (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        let user = User { id, name, email };
        users.push(user.clone());
        Ok(user)
    }

    pub async fn update(&self, id: &str, name: Option<String>, email: Option<String>) -> Option<User> {
        let mut users = self.users.write().await;
        let user = users.iter_mut().find(|u| u.id == id)?;
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(email) = email {
            user.email = email;
        }
        Some(user.clone())
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        users.len() != before
    }
}

#[derive(Deserialize)]
struct SayHelloInput {
    name: String,
}

#[derive(Serialize)]
struct SayHelloOutput {
    greeting: String,
}

#[derive(Deserialize, Serialize)]
struct EchoPayload {
    payload: String,
}

#[derive(Deserialize)]
struct ListUsersInput {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ListUsersOutput {
    users: Vec<User>,
}

#[derive(Deserialize)]
struct UserId {
    id: String,
}

#[derive(Deserialize)]
struct CreateUserInput {
    name: String,
    email: String,
}

#[derive(Deserialize)]
struct UpdateUserInput {
    id: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Serialize)]
struct Removed {
    removed: bool,
}

#[derive(Serialize)]
struct WhoAmI {
    name: String,
}

fn user_schema() -> Schema {
    Schema::object([
        ("id", Schema::string()),
        ("name", Schema::string()),
        ("email", Schema::string().format("email")),
    ])
    .named("User")
    .describe("A registered user")
}

fn user_not_found(id: &str) -> ProcedureError {
    ProcedureError::new(ErrorCode::NotFound, format!("User {} not found", id))
}

fn auth_header() -> HeaderParam {
    HeaderParam::new("Authorization").description("Bearer token naming the caller")
}

fn greeting() -> ProcedureGroup<GreeterContext> {
    ProcedureGroup::new()
        .procedure(
            "sayHello",
            ProcedureDescriptor::query(HttpMethod::Get, "/say-hello")
                .summary("Say hello")
                .tag("greeting")
                .input(Schema::object([("name", Schema::string().describe("Who to greet"))]))
                .output(Schema::object([("greeting", Schema::string())])),
            |input: SayHelloInput, _ctx: Arc<GreeterContext>| async move {
                Ok(SayHelloOutput {
                    greeting: format!("Hello {}!", input.name),
                })
            },
        )
        .procedure(
            "echo",
            ProcedureDescriptor::query(HttpMethod::Get, "/echo")
                .summary("Echo a payload back")
                .tag("greeting")
                .input(Schema::object([("payload", Schema::string())]))
                .output(Schema::object([("payload", Schema::string())])),
            |input: EchoPayload, _ctx: Arc<GreeterContext>| async move { Ok(input) },
        )
}

fn users() -> ProcedureGroup<GreeterContext> {
    ProcedureGroup::new()
        .procedure(
            "list",
            ProcedureDescriptor::query(HttpMethod::Get, "/users")
                .summary("List users")
                .tag("users")
                .input(Schema::object([(
                    "limit",
                    Schema::integer()
                        .refine("Limit must not be negative", |v| v.as_u64().is_some())
                        .optional(),
                )]))
                .output(Schema::object([("users", Schema::array(user_schema()))])),
            |input: ListUsersInput, ctx: Arc<GreeterContext>| async move {
                Ok(ListUsersOutput {
                    users: ctx.store.list(input.limit).await,
                })
            },
        )
        .procedure(
            "me",
            ProcedureDescriptor::query(HttpMethod::Get, "/users/me")
                .summary("Name of the calling user")
                .tag("users")
                .protect()
                .header(auth_header().required())
                .input(Schema::void())
                .output(Schema::object([("name", Schema::string())])),
            |_: serde_json::Value, ctx: Arc<GreeterContext>| async move {
                let name = ctx.require_caller()?.to_string();
                Ok(WhoAmI { name })
            },
        )
        .procedure(
            "get",
            ProcedureDescriptor::query(HttpMethod::Get, "/users/{id}")
                .summary("Fetch a user")
                .tag("users")
                .input(Schema::object([("id", Schema::string())]))
                .output(user_schema()),
            |input: UserId, ctx: Arc<GreeterContext>| async move {
                ctx.store.get(&input.id).await.ok_or_else(|| user_not_found(&input.id))
            },
        )
        .procedure(
            "create",
            ProcedureDescriptor::mutation(HttpMethod::Post, "/users")
                .summary("Register a user")
                .tag("users")
                .protect()
                .content_types(["application/json", "application/x-www-form-urlencoded"])
                .input(Schema::object([
                    ("name", Schema::string()),
                    ("email", Schema::string().format("email")),
                ]))
                .output(user_schema()),
            |input: CreateUserInput, ctx: Arc<GreeterContext>| async move {
                let caller = ctx.require_caller()?;
                debug!("{} registers {}", caller, input.email);
                ctx.store.create(input.name, input.email).await
            },
        )
        .procedure(
            "update",
            ProcedureDescriptor::mutation(HttpMethod::Patch, "/users/{id}")
                .summary("Update a user")
                .tag("users")
                .protect()
                .input(Schema::object([
                    ("id", Schema::string()),
                    ("name", Schema::string().optional()),
                    ("email", Schema::string().format("email").optional()),
                ]))
                .output(user_schema()),
            |input: UpdateUserInput, ctx: Arc<GreeterContext>| async move {
                ctx.require_caller()?;
                ctx.store
                    .update(&input.id, input.name, input.email)
                    .await
                    .ok_or_else(|| user_not_found(&input.id))
            },
        )
        .procedure(
            "remove",
            ProcedureDescriptor::query(HttpMethod::Delete, "/users/{id}")
                .summary("Remove a user")
                .tag("users")
                .protect()
                .input(Schema::object([("id", Schema::string())]))
                .output(Schema::object([("removed", Schema::boolean())])),
            |input: UserId, ctx: Arc<GreeterContext>| async move {
                ctx.require_caller()?;
                Ok(Removed {
                    removed: ctx.store.remove(&input.id).await,
                })
            },
        )
}

/// All procedures served by the demo
pub fn procedures() -> ProcedureGroup<GreeterContext> {
    ProcedureGroup::new()
        .nest("greeting", greeting())
        .nest("users", users())
}

/// Build the demo gateway over `store`
pub fn build_gateway(config: GatewayConfig, store: Arc<UserStore>) -> GatewayResult<Gateway<GreeterContext>> {
    Gateway::builder(procedures())
        .title("Greeter API")
        .version(env!("CARGO_PKG_VERSION"))
        .description("Greetings and a user directory")
        .base_url("http://localhost:3000")
        .config(config)
        .create_context(move |parts| {
            let caller = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            let store = Arc::clone(&store);
            async move { Ok(GreeterContext { store, caller }) }
        })
        .response_meta(|args| match (args.name, args.error) {
            (Some("users.create"), None) => ResponseMeta::default().status(StatusCode::CREATED),
            _ => ResponseMeta::default(),
        })
        .build()
}
