//! Query strategy resolution
//!
//! Pipefy offers two ways to list a pipe's cards:
//!
//! - **`allCards`**: one flat, cursor-paginated listing. Cheapest, but the
//!   capability can be permission-gated per integration token.
//! - **phase-nested**: `pipe → phases → cards`. Always available, one request
//!   per pipe, flattened here in phase order.
//!
//! `QueryStrategy` tries the primary shape and switches to the fallback iff a
//! reply is transport-unsuccessful, carries GraphQL errors, or lacks the
//! expected top-level listing (`fallback_reason`). The rule is a pure function
//! over `GraphQlReply` so it is testable without a network.

use super::card::{ExternalCard, FieldDefinition};
use crate::{PipeSyncError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Fixed page size ceiling for card listings
pub const PAGE_SIZE: u32 = 200;

/// Upper bound on `allCards` pages followed for one pipe
pub const MAX_PAGES: u32 = 50;

const ALL_CARDS_QUERY: &str = r#"
    query($pipeId: ID!, $first: Int!, $after: String) {
        allCards(pipeId: $pipeId, first: $first, after: $after) {
            pageInfo { hasNextPage endCursor }
            edges { node {
                id
                title
                fields { name value field { id label internal_id } }
            } }
        }
    }
"#;

const PHASE_CARDS_QUERY: &str = r#"
    query($id: ID!, $first: Int!) {
        pipe(id: $id) {
            id
            name
            phases {
                name
                cards(first: $first) {
                    edges { node {
                        id
                        title
                        fields { name value field { id label internal_id } }
                    } }
                }
            }
        }
    }
"#;

const PIPE_FIELDS_QUERY: &str = r#"
    query($id: ID!) {
        pipe(id: $id) {
            id
            name
            start_form_fields { id label internal_id type }
            phases { name fields { id label internal_id type } }
        }
    }
"#;

/// A GraphQL request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQlRequest {
    pub query: String,
    pub variables: Value,
}

impl GraphQlRequest {
    pub fn new(query: impl Into<String>, variables: Value) -> Self {
        Self {
            query: query.into(),
            variables,
        }
    }
}

/// One entry of a GraphQL `errors` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
}

/// Structured reply from the remote tracker
///
/// `success` reflects the transport (HTTP 2xx). A reply can be successful and
/// still carry application errors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphQlReply {
    pub success: bool,
    pub status: u16,
    pub data: Option<Value>,
    pub errors: Vec<GraphQlError>,
}

impl GraphQlReply {
    /// A 200 reply carrying `data`
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            status: 200,
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// A 200 reply carrying only GraphQL errors
    pub fn with_errors(messages: &[&str]) -> Self {
        Self {
            success: true,
            status: 200,
            data: None,
            errors: messages
                .iter()
                .map(|m| GraphQlError {
                    message: (*m).to_string(),
                })
                .collect(),
        }
    }

    /// A non-2xx reply without a usable body
    pub fn http_failure(status: u16) -> Self {
        Self {
            success: false,
            status,
            data: None,
            errors: Vec::new(),
        }
    }

    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Capability: execute a GraphQL request against the remote tracker
///
/// `Err` is reserved for transport failures (no reply at all). Any reply the
/// server produced, error payloads and non-2xx statuses included, is `Ok`.
#[async_trait]
pub trait RemoteQuery: Send + Sync {
    async fn execute(&self, request: &GraphQlRequest) -> Result<GraphQlReply>;
}

#[async_trait]
impl<T: RemoteQuery + ?Sized> RemoteQuery for std::sync::Arc<T> {
    async fn execute(&self, request: &GraphQlRequest) -> Result<GraphQlReply> {
        (**self).execute(request).await
    }
}

/// Why the primary shape was abandoned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    Transport(String),
    HttpStatus(u16),
    ApplicationErrors(String),
    UnexpectedShape,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::Transport(e) => write!(f, "transport failure: {}", e),
            FallbackReason::HttpStatus(s) => write!(f, "HTTP {}", s),
            FallbackReason::ApplicationErrors(e) => write!(f, "GraphQL errors: {}", e),
            FallbackReason::UnexpectedShape => write!(f, "response lacks the expected listing"),
        }
    }
}

/// The two listing shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// `allCards(pipeId)` flat listing
    AllCards,
    /// `pipe(id) { phases { cards } }` nested listing
    PhaseCards,
}

/// One page of cards parsed from a reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardPage {
    pub cards: Vec<ExternalCard>,
    pub next_cursor: Option<String>,
}

/// Why a reply could not be read as a card listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    /// The listing is absent or null
    Missing,
    /// The listing is present but not a readable structure
    Malformed(String),
}

impl std::fmt::Display for ListingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingError::Missing => write!(f, "listing is missing"),
            ListingError::Malformed(m) => write!(f, "malformed listing: {}", m),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default, rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(default, rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PipeFields {
    #[serde(default)]
    start_form_fields: Option<Vec<FieldDefinition>>,
    #[serde(default)]
    phases: Option<Vec<PhaseFields>>,
}

#[derive(Debug, Deserialize)]
struct PhaseFields {
    #[serde(default)]
    fields: Option<Vec<FieldDefinition>>,
}

/// Flatten a `pipe { start_form_fields phases { fields } }` payload
///
/// Start-form fields come first, then each phase's fields in phase order.
pub fn parse_field_definitions(data: &Value) -> Result<Vec<FieldDefinition>> {
    let pipe = match data.get("pipe") {
        Some(pipe) if !pipe.is_null() => pipe.clone(),
        _ => return Ok(Vec::new()),
    };
    let pipe: PipeFields = serde_json::from_value(pipe)?;

    let mut all = pipe.start_form_fields.unwrap_or_default();
    for phase in pipe.phases.unwrap_or_default() {
        all.extend(phase.fields.unwrap_or_default());
    }
    Ok(all)
}

/// Read the cards of an `edges` list one node at a time
///
/// Null nodes are ignored and unreadable nodes are skipped with a warning,
/// so one bad card never hides the rest of the listing.
fn edge_cards(edges: &Value, context: &str) -> std::result::Result<Vec<ExternalCard>, ListingError> {
    let edges = edges
        .as_array()
        .ok_or_else(|| ListingError::Malformed(format!("{} edges is not a list", context)))?;

    let mut cards = Vec::with_capacity(edges.len());
    for edge in edges {
        let node = match edge.get("node") {
            Some(node) if !node.is_null() => node,
            _ => continue,
        };
        match serde_json::from_value::<ExternalCard>(node.clone()) {
            Ok(card) => cards.push(card),
            Err(e) => {
                let card = node.get("id").unwrap_or(&Value::Null);
                warn!(card = %card, error = %e, "Skipping unreadable card");
            }
        }
    }
    Ok(cards)
}

fn present<'a>(value: Option<&'a Value>) -> Option<&'a Value> {
    value.filter(|v| !v.is_null())
}

impl QueryShape {
    /// Build the request for this shape
    pub fn request(&self, container: &str, cursor: Option<&str>) -> GraphQlRequest {
        match self {
            QueryShape::AllCards => GraphQlRequest::new(
                ALL_CARDS_QUERY,
                serde_json::json!({ "pipeId": container, "first": PAGE_SIZE, "after": cursor }),
            ),
            QueryShape::PhaseCards => GraphQlRequest::new(
                PHASE_CARDS_QUERY,
                serde_json::json!({ "id": container, "first": PAGE_SIZE }),
            ),
        }
    }

    /// Parse `data` for this shape
    ///
    /// Unreadable card nodes are skipped. The whole page fails only when the
    /// listing itself is missing or has the wrong structure.
    pub fn parse(&self, data: &Value) -> std::result::Result<CardPage, ListingError> {
        match self {
            QueryShape::AllCards => {
                let listing = present(data.get("allCards")).ok_or(ListingError::Missing)?;
                if !listing.is_object() {
                    return Err(ListingError::Malformed("allCards is not an object".to_string()));
                }
                let edges = present(listing.get("edges"))
                    .ok_or_else(|| ListingError::Malformed("allCards has no edges".to_string()))?;
                let next_cursor = listing
                    .get("pageInfo")
                    .and_then(|p| serde_json::from_value::<PageInfo>(p.clone()).ok())
                    .filter(|p| p.has_next_page)
                    .and_then(|p| p.end_cursor);
                Ok(CardPage {
                    cards: edge_cards(edges, "allCards")?,
                    next_cursor,
                })
            }
            QueryShape::PhaseCards => {
                let phases = present(present(data.get("pipe")).and_then(|p| p.get("phases")))
                    .ok_or(ListingError::Missing)?;
                let phases = phases
                    .as_array()
                    .ok_or_else(|| ListingError::Malformed("pipe.phases is not a list".to_string()))?;

                let mut cards = Vec::new();
                for (index, phase) in phases.iter().enumerate() {
                    if !phase.is_object() {
                        return Err(ListingError::Malformed(format!(
                            "phase {} is not an object",
                            index
                        )));
                    }
                    let name = phase.get("name").and_then(Value::as_str).unwrap_or("");
                    let phase_cards = match present(phase.get("cards")).and_then(|c| present(c.get("edges"))) {
                        Some(edges) => edge_cards(edges, "phase")?,
                        None => Vec::new(),
                    };
                    debug!(phase = name, cards = phase_cards.len(), "Flattened phase");
                    cards.extend(phase_cards);
                }
                Ok(CardPage {
                    cards,
                    next_cursor: None,
                })
            }
        }
    }
}

/// Decide whether a primary reply forces the fallback
///
/// Returns `None` when the reply is usable as-is.
pub fn fallback_reason(shape: QueryShape, outcome: &Result<GraphQlReply>) -> Option<FallbackReason> {
    read_page(shape, outcome).err()
}

fn read_page(
    shape: QueryShape,
    outcome: &Result<GraphQlReply>,
) -> std::result::Result<CardPage, FallbackReason> {
    let reply = match outcome {
        Ok(reply) => reply,
        Err(e) => return Err(FallbackReason::Transport(e.to_string())),
    };

    if !reply.success {
        return Err(FallbackReason::HttpStatus(reply.status));
    }
    if !reply.errors.is_empty() {
        return Err(FallbackReason::ApplicationErrors(reply.error_summary()));
    }
    let data = reply.data.as_ref().ok_or(FallbackReason::UnexpectedShape)?;
    shape.parse(data).map_err(|e| {
        debug!(error = %e, "Primary listing unreadable");
        FallbackReason::UnexpectedShape
    })
}

/// Two-step strategy: primary shape, then fallback shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryStrategy {
    pub primary: QueryShape,
    pub fallback: QueryShape,
}

impl Default for QueryStrategy {
    fn default() -> Self {
        Self {
            primary: QueryShape::AllCards,
            fallback: QueryShape::PhaseCards,
        }
    }
}

/// Which shape produced a container's cards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVia {
    Primary,
    Fallback,
}

/// Cards fetched for one container
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedCards {
    pub cards: Vec<ExternalCard>,
    pub via: ResolvedVia,
}

/// Fetches the cards of one container using a `QueryStrategy`
pub struct CardResolver<Q> {
    remote: Q,
    strategy: QueryStrategy,
}

impl<Q: RemoteQuery> CardResolver<Q> {
    pub fn new(remote: Q) -> Self {
        Self {
            remote,
            strategy: QueryStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: QueryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> QueryStrategy {
        self.strategy
    }

    pub fn remote(&self) -> &Q {
        &self.remote
    }

    /// Fetch every card of `container`
    ///
    /// An empty container is `Ok(vec![])`. Fails only when the fallback shape
    /// fails too; the error names the container.
    pub async fn fetch_cards(&self, container: &str) -> Result<FetchedCards> {
        match self.fetch_primary(container).await {
            Ok(cards) => {
                info!(container = %container, cards = cards.len(), "Fetched cards");
                Ok(FetchedCards {
                    cards,
                    via: ResolvedVia::Primary,
                })
            }
            Err(reason) => {
                warn!(
                    container = %container,
                    reason = %reason,
                    "Primary card listing unusable, retrying with fallback shape"
                );
                super::metrics::record_query_fallback(container);
                let cards = self.fetch_fallback(container).await?;
                info!(container = %container, cards = cards.len(), "Fetched cards via fallback");
                Ok(FetchedCards {
                    cards,
                    via: ResolvedVia::Fallback,
                })
            }
        }
    }

    /// List the field definitions of `container`
    ///
    /// Used to discover the stable identifiers that go into `FieldBindings`.
    /// There is no fallback shape here: any error fails the call.
    pub async fn inspect_fields(&self, container: &str) -> Result<Vec<FieldDefinition>> {
        let request = GraphQlRequest::new(PIPE_FIELDS_QUERY, serde_json::json!({ "id": container }));
        let reply = self.remote.execute(&request).await?;

        if !reply.success {
            return Err(PipeSyncError::Remote(format!(
                "pipe {}: field inspection failed with HTTP {}",
                container, reply.status
            )));
        }
        if !reply.errors.is_empty() {
            return Err(PipeSyncError::Remote(format!(
                "pipe {}: GraphQL errors: {}",
                container,
                reply.error_summary()
            )));
        }

        let fields = match reply.data {
            Some(data) => parse_field_definitions(&data)?,
            None => Vec::new(),
        };
        debug!(container = %container, fields = fields.len(), "Inspected fields");
        Ok(fields)
    }

    async fn fetch_primary(
        &self,
        container: &str,
    ) -> std::result::Result<Vec<ExternalCard>, FallbackReason> {
        let shape = self.strategy.primary;
        let mut cards = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..MAX_PAGES {
            let outcome = self
                .remote
                .execute(&shape.request(container, cursor.as_deref()))
                .await;

            let parsed = read_page(shape, &outcome)?;

            debug!(container = %container, page, cards = parsed.cards.len(), "Fetched page");
            cards.extend(parsed.cards);

            match parsed.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(cards),
            }
        }

        warn!(
            container = %container,
            max_pages = MAX_PAGES,
            "Page limit reached, remaining cards skipped"
        );
        Ok(cards)
    }

    async fn fetch_fallback(&self, container: &str) -> Result<Vec<ExternalCard>> {
        let shape = self.strategy.fallback;
        let reply = self
            .remote
            .execute(&shape.request(container, None))
            .await
            .map_err(|e| {
                PipeSyncError::Remote(format!("pipe {}: fallback request failed: {}", container, e))
            })?;

        if !reply.errors.is_empty() {
            return Err(PipeSyncError::Remote(format!(
                "pipe {}: GraphQL errors (fallback): {}",
                container,
                reply.error_summary()
            )));
        }
        if !reply.success {
            return Err(PipeSyncError::Remote(format!(
                "pipe {}: fallback request failed with HTTP {}",
                container, reply.status
            )));
        }

        let data = match reply.data.as_ref() {
            Some(data) => data,
            None => {
                warn!(container = %container, "Fallback response has no data, treating as empty");
                return Ok(Vec::new());
            }
        };
        match shape.parse(data) {
            Ok(page) => Ok(page.cards),
            Err(ListingError::Missing) => {
                warn!(container = %container, "Fallback response has no phases, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(PipeSyncError::Remote(format!("pipe {}: fallback {}", container, e))),
        }
    }
}
