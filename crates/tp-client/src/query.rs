//! Structured filters and the filter-language compiler.
//!
//! The upstream `where` language is only ever *built* here, never parsed.

use crate::entity::EntityType;

/// Date field used for range filters when none is given.
pub const DEFAULT_DATE_FIELD: &str = "CreateDate";

pub const DEFAULT_SEARCH_TAKE: u32 = 100;
pub const MAX_SEARCH_TAKE: u32 = 1000;

/// A filter value that can reference a record either by numeric id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrName {
    Id(i64),
    Name(String),
}

impl From<i64> for IdOrName {
    fn from(value: i64) -> Self {
        Self::Id(value)
    }
}

impl From<&str> for IdOrName {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for IdOrName {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub status: Option<String>,
    /// Name variant is matched against the user's email.
    pub assigned_user: Option<IdOrName>,
    pub project: Option<IdOrName>,
    pub team: Option<IdOrName>,
    pub feature: Option<IdOrName>,
    pub priority: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// `CreateDate`, `ModifyDate`, `StartDate`, `EndDate`, `PlannedStartDate`, `PlannedEndDate`.
    pub date_field: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub entity_type: EntityType,
    pub filters: SearchFilters,
    pub raw_where: Option<String>,
    pub include: Vec<String>,
    pub take: Option<u32>,
    pub order_by: Option<OrderBy>,
    /// Continuation link from a previous page. When set, every other field except
    /// `entity_type` is ignored.
    pub cursor: Option<String>,
}

impl SearchRequest {
    #[must_use]
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            filters: SearchFilters::default(),
            raw_where: None,
            include: Vec::new(),
            take: None,
            order_by: None,
            cursor: None,
        }
    }

    /// Continue a previous search from its cursor.
    #[must_use]
    pub fn from_cursor(entity_type: EntityType, cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            ..Self::new(entity_type)
        }
    }

    #[must_use]
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn with_raw_where(mut self, raw_where: impl Into<String>) -> Self {
        self.raw_where = Some(raw_where.into());
        self
    }

    #[must_use]
    pub fn with_take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub fn with_include<I, S>(mut self, include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = include.into_iter().map(Into::into).collect();
        self
    }

    /// The cursor, if one was supplied and is non-empty.
    #[must_use]
    pub fn active_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// Double single quotes so the value can sit inside a quoted literal.
#[must_use]
pub fn escape_value(value: &str) -> String {
    value.replace('\'', "''")
}

#[must_use]
pub fn string_condition(field: &str, op: &str, value: &str) -> String {
    format!("{field} {op} '{}'", escape_value(value))
}

#[must_use]
pub fn number_condition(field: &str, op: &str, value: i64) -> String {
    format!("{field} {op} {value}")
}

/// Compile filters plus an optional raw fragment into a single `where` expression.
///
/// Predicates always appear in the same order (status, assigned user, project, team, feature,
/// priority, date range, raw fragment) and are joined with `and`. Returns an empty string when
/// nothing was emitted.
#[must_use]
pub fn compile(filters: &SearchFilters, raw_where: Option<&str>) -> String {
    let mut conditions: Vec<String> = Vec::new();

    if let Some(status) = non_empty(filters.status.as_deref()) {
        conditions.push(string_condition("EntityState.Name", "eq", status));
    }

    push_id_or_name(
        &mut conditions,
        filters.assigned_user.as_ref(),
        "AssignedUser.Id",
        "AssignedUser.Email",
    );
    push_id_or_name(
        &mut conditions,
        filters.project.as_ref(),
        "Project.Id",
        "Project.Name",
    );
    push_id_or_name(&mut conditions, filters.team.as_ref(), "Team.Id", "Team.Name");
    push_id_or_name(
        &mut conditions,
        filters.feature.as_ref(),
        "Feature.Id",
        "Feature.Name",
    );

    if let Some(priority) = non_empty(filters.priority.as_deref()) {
        conditions.push(string_condition("Priority.Name", "eq", priority));
    }

    let date_field = non_empty(filters.date_field.as_deref()).unwrap_or(DEFAULT_DATE_FIELD);
    if let Some(from) = non_empty(filters.date_from.as_deref()) {
        conditions.push(string_condition(date_field, "gte", from));
    }
    if let Some(to) = non_empty(filters.date_to.as_deref()) {
        conditions.push(string_condition(date_field, "lte", to));
    }

    if let Some(raw) = non_empty(raw_where) {
        conditions.push(raw.to_string());
    }

    conditions.join(" and ")
}

fn push_id_or_name(
    conditions: &mut Vec<String>,
    value: Option<&IdOrName>,
    id_field: &str,
    name_field: &str,
) {
    match value {
        Some(IdOrName::Id(id)) => conditions.push(number_condition(id_field, "eq", *id)),
        Some(IdOrName::Name(name)) if !name.is_empty() => {
            conditions.push(string_condition(name_field, "eq", name));
        }
        Some(IdOrName::Name(_)) | None => {}
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}
