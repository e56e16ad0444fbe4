#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Ordering, boundary predicates and continuation tokens for paged node listings.
//!
//! A token captures where the previous page ended: the ordering field's value on the last
//! row, that row's id, and for time orderings every id already returned that shares the
//! boundary value. Resuming excludes exactly those ids, so ties are never skipped or
//! repeated.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{CatalogError, Result};

/// Largest page a single listing returns.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page size used when the caller does not choose one.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Column a listing is ordered by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderByField {
    CreateTime,
    LastUpdateTime,
    #[default]
    Id,
}

impl OrderByField {
    /// Backing column name.
    pub const fn column(self) -> &'static str {
        match self {
            OrderByField::CreateTime => "create_time_since_epoch",
            OrderByField::LastUpdateTime => "last_update_time_since_epoch",
            OrderByField::Id => "id",
        }
    }
}

/// Ordering field plus direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: OrderByField,
    pub is_asc: bool,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            field: OrderByField::Id,
            is_asc: true,
        }
    }
}

/// Caller-facing listing options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListOptions {
    /// Requested page size; capped at [`MAX_PAGE_SIZE`].
    pub max_result_size: i64,
    pub order_by: OrderBy,
    /// Token returned with the previous page.
    pub next_page_token: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            max_result_size: DEFAULT_PAGE_SIZE,
            order_by: OrderBy::default(),
            next_page_token: None,
        }
    }
}

/// Options recorded inside a token, without the token itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOptions {
    pub max_result_size: i64,
    pub order_by: OrderBy,
}

impl From<&ListOptions> for TokenOptions {
    fn from(options: &ListOptions) -> Self {
        Self {
            max_result_size: options.max_result_size,
            order_by: options.order_by,
        }
    }
}

/// Decoded continuation token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    pub field_offset: i64,
    pub id_offset: i64,
    #[serde(default)]
    pub listed_ids: Vec<i64>,
    pub set_options: TokenOptions,
}

impl PageToken {
    /// Opaque URL-safe text form.
    pub fn encode(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|err| CatalogError::Internal(format!("failed to encode page token: {err}")))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parses a token produced by [`PageToken::encode`].
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|err| CatalogError::InvalidArgument(format!("malformed page token: {err}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| CatalogError::InvalidArgument(format!("malformed page token: {err}")))
    }
}

/// Decodes the options' token, if any, and checks it was issued for the same ordering.
pub fn decode_token_for(options: &ListOptions) -> Result<Option<PageToken>> {
    let Some(raw) = options.next_page_token.as_deref() else {
        return Ok(None);
    };
    let token = PageToken::decode(raw).inspect_err(|err| {
        warn!(error = %err, "list.token.rejected");
    })?;
    if token.set_options.order_by != options.order_by {
        warn!(
            token_field = ?token.set_options.order_by.field,
            token_asc = token.set_options.order_by.is_asc,
            field = ?options.order_by.field,
            asc = options.order_by.is_asc,
            "list.token.rejected"
        );
        return Err(CatalogError::InvalidArgument(
            "page token was issued for a different ordering".into(),
        ));
    }
    Ok(Some(token))
}

/// Boundary predicate that resumes after `token`, or ` TRUE ` for a first page.
pub fn ordering_threshold_clause(order_by: OrderBy, token: Option<&PageToken>) -> String {
    let Some(token) = token else {
        return " TRUE ".to_string();
    };
    let (op, strict) = if order_by.is_asc { (">=", ">") } else { ("<=", "<") };
    match order_by.field {
        OrderByField::Id => format!(" `id` {strict} {} ", token.field_offset),
        field if token.listed_ids.is_empty() => format!(
            " `{}` {op} {} AND `id` {strict} {} ",
            field.column(),
            token.field_offset,
            token.id_offset
        ),
        field => {
            let listed = token
                .listed_ids
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            format!(
                " `{}` {op} {} AND `id` NOT IN ({listed}) ",
                field.column(),
                token.field_offset
            )
        }
    }
}

/// `ORDER BY` clause with `id` as the tie breaker.
pub fn order_by_clause(order_by: OrderBy) -> String {
    let direction = if order_by.is_asc { "ASC" } else { "DESC" };
    match order_by.field {
        OrderByField::Id => format!(" ORDER BY `id` {direction} "),
        field => format!(
            " ORDER BY `{}` {direction}, `id` {direction} ",
            field.column()
        ),
    }
}

/// Rows a page holds: the size capped at [`MAX_PAGE_SIZE`]. Non-positive sizes are invalid.
pub fn page_size(max_result_size: i64) -> Result<i64> {
    if max_result_size <= 0 {
        return Err(CatalogError::InvalidArgument(format!(
            "max_result_size must be positive, got {max_result_size}"
        )));
    }
    Ok(max_result_size.min(MAX_PAGE_SIZE))
}

/// `LIMIT` clause fetching one look-ahead row past the page.
pub fn limit_clause(max_result_size: i64) -> Result<String> {
    Ok(format!(" LIMIT {} ", page_size(max_result_size)? + 1))
}

/// Predicate, ordering and limit for `options`, plus the token they resume from.
pub fn list_clauses(options: &ListOptions) -> Result<(String, Option<PageToken>)> {
    let limit = limit_clause(options.max_result_size)?;
    let token = decode_token_for(options)?;
    let mut clauses = ordering_threshold_clause(options.order_by, token.as_ref());
    clauses.push_str(&order_by_clause(options.order_by));
    clauses.push_str(&limit);
    Ok((clauses, token))
}

/// Ordering-relevant fields of one listed node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageRow {
    pub id: i64,
    pub create_time_since_epoch: i64,
    pub last_update_time_since_epoch: i64,
}

impl PageRow {
    fn value(&self, field: OrderByField) -> i64 {
        match field {
            OrderByField::CreateTime => self.create_time_since_epoch,
            OrderByField::LastUpdateTime => self.last_update_time_since_epoch,
            OrderByField::Id => self.id,
        }
    }
}

/// Token that resumes after the last of `rows`, the page just returned in order.
///
/// Returns `None` for an empty page.
pub fn next_page_token(
    options: &ListOptions,
    previous: Option<&PageToken>,
    rows: &[PageRow],
) -> Result<Option<String>> {
    let Some(last) = rows.last() else {
        return Ok(None);
    };
    let field = options.order_by.field;
    let field_offset = last.value(field);
    let listed_ids = match field {
        OrderByField::Id => Vec::new(),
        _ => {
            let mut ids = match previous {
                Some(prev) if prev.field_offset == field_offset => prev.listed_ids.clone(),
                _ => Vec::new(),
            };
            ids.extend(
                rows.iter()
                    .filter(|row| row.value(field) == field_offset)
                    .map(|row| row.id),
            );
            ids
        }
    };
    let token = PageToken {
        field_offset,
        id_offset: last.id,
        listed_ids,
        set_options: TokenOptions::from(options),
    };
    token.encode().map(Some)
}
