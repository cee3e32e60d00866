//! Method and path dispatch.
//!
//! Routes are a static, ordered table of (method, path pattern, operation kind). Resolution is a
//! pure function of the method, the path and the `q` query parameter; nothing here touches a
//! collaborator.
//!
//! | Method | Path                       | Operation              |
//! |--------|----------------------------|------------------------|
//! | POST   | `/patients/{id}/documents` | issue upload link      |
//! | GET    | `/patients`                | list, or search on `q` |
//! | POST   | `/patients`                | create                 |
//! | GET    | `/patients/{id}`           | get                    |
//! | PUT    | `/patients/{id}`           | partial update         |
//! | DELETE | `/patients/{id}`           | delete                 |
//!
//! A path that matches a pattern under an unlisted method resolves to
//! [`ApiError::UnsupportedMethod`] (405); a path matching no pattern resolves to
//! [`ApiError::UnsupportedRoute`] (400).

use crate::constants::{COLLECTION_ROOT, DOCUMENTS_SEGMENT};
use crate::error::{ApiError, ApiResult};
use http::Method;
use phcare_types::PatientId;

/// Logical operation selected for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    List,
    Search { query: String },
    Create,
    Get { id: PatientId },
    Update { id: PatientId },
    Delete { id: PatientId },
    IssueUploadLink { patient_id: PatientId },
}

impl Operation {
    /// Whether the operation mutates state or issues a write credential.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Create
                | Operation::Update { .. }
                | Operation::Delete { .. }
                | Operation::IssueUploadLink { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Search { .. } => "search",
            Operation::Create => "create",
            Operation::Get { .. } => "get",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::IssueUploadLink { .. } => "issue_upload_link",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathPattern {
    /// `/patients`
    Collection,
    /// `/patients/{id}`
    Item,
    /// `/patients/{id}/documents`
    ItemDocuments,
}

impl PathPattern {
    /// Returns `Some(captured id)` when the segments match this pattern.
    fn capture<'a>(self, segments: &[&'a str]) -> Option<Option<&'a str>> {
        match (self, segments) {
            (PathPattern::Collection, []) => Some(None),
            (PathPattern::Item, [id]) => Some(Some(*id)),
            (PathPattern::ItemDocuments, [id, DOCUMENTS_SEGMENT]) => Some(Some(*id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    ListOrSearch,
    Create,
    Get,
    Update,
    Delete,
    IssueUploadLink,
}

struct Route {
    method: Method,
    pattern: PathPattern,
    kind: OperationKind,
}

static ROUTES: [Route; 6] = [
    Route {
        method: Method::POST,
        pattern: PathPattern::ItemDocuments,
        kind: OperationKind::IssueUploadLink,
    },
    Route {
        method: Method::GET,
        pattern: PathPattern::Collection,
        kind: OperationKind::ListOrSearch,
    },
    Route {
        method: Method::POST,
        pattern: PathPattern::Collection,
        kind: OperationKind::Create,
    },
    Route {
        method: Method::GET,
        pattern: PathPattern::Item,
        kind: OperationKind::Get,
    },
    Route {
        method: Method::PUT,
        pattern: PathPattern::Item,
        kind: OperationKind::Update,
    },
    Route {
        method: Method::DELETE,
        pattern: PathPattern::Item,
        kind: OperationKind::Delete,
    },
];

/// Splits a request path into the segments below the collection root.
///
/// Returns `None` for paths outside the collection or with empty segments. A single trailing
/// slash is tolerated.
fn collection_segments(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix(COLLECTION_ROOT)?;
    let rest = match rest {
        "" | "/" => return Some(Vec::new()),
        rest => rest.strip_prefix('/')?,
    };
    let rest = rest.strip_suffix('/').unwrap_or(rest);

    let segments: Vec<&str> = rest.split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return None;
    }
    Some(segments)
}

/// Resolves a request to an operation.
///
/// `search` is the value of the `q` query parameter; when it is absent or empty, a collection
/// read lists every record.
///
/// # Errors
/// - `ApiError::UnsupportedMethod` when the path is known but the method is not routed for it.
/// - `ApiError::UnsupportedRoute` when the path matches no pattern.
pub fn resolve(method: &Method, path: &str, search: Option<&str>) -> ApiResult<Operation> {
    let segments = collection_segments(path).ok_or(ApiError::UnsupportedRoute)?;

    let mut path_matched = false;
    for route in &ROUTES {
        let Some(captured) = route.pattern.capture(&segments) else {
            continue;
        };
        path_matched = true;
        if route.method != *method {
            continue;
        }
        return build_operation(route.kind, captured, search);
    }

    if path_matched {
        Err(ApiError::UnsupportedMethod(method.to_string()))
    } else {
        Err(ApiError::UnsupportedRoute)
    }
}

fn build_operation(
    kind: OperationKind,
    captured: Option<&str>,
    search: Option<&str>,
) -> ApiResult<Operation> {
    let id = || {
        captured
            .and_then(|raw| PatientId::parse(raw).ok())
            .ok_or(ApiError::UnsupportedRoute)
    };

    Ok(match kind {
        OperationKind::ListOrSearch => match search.filter(|q| !q.is_empty()) {
            Some(query) => Operation::Search {
                query: query.to_owned(),
            },
            None => Operation::List,
        },
        OperationKind::Create => Operation::Create,
        OperationKind::Get => Operation::Get { id: id()? },
        OperationKind::Update => Operation::Update { id: id()? },
        OperationKind::Delete => Operation::Delete { id: id()? },
        OperationKind::IssueUploadLink => Operation::IssueUploadLink { patient_id: id()? },
    })
}
