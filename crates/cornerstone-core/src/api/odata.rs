//! OData query options for the reporting views.

use std::fmt;

use chrono::NaiveDate;

/// A value on the right-hand side of a filter comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Quoted; embedded `'` doubled.
    Text(String),
    Number(i64),
    /// Rendered as `YYYY-MM-DD`.
    Date(NaiveDate),
    /// Rendered verbatim, e.g. GUIDs on views that compare them unquoted.
    Raw(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(text) => write!(f, "'{}'", text.replace('\'', "''")),
            Literal::Number(number) => write!(f, "{}", number),
            Literal::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Literal::Raw(raw) => f.write_str(raw),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Number(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Number(i64::from(value))
    }
}

impl From<NaiveDate> for Literal {
    fn from(value: NaiveDate) -> Self {
        Literal::Date(value)
    }
}

/// A `$filter` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter(String);

impl Filter {
    fn compare(field: &str, op: &str, value: impl Into<Literal>) -> Self {
        Filter(format!("{} {} {}", field, op, value.into()))
    }

    pub fn eq(field: &str, value: impl Into<Literal>) -> Self {
        Self::compare(field, "eq", value)
    }

    pub fn ne(field: &str, value: impl Into<Literal>) -> Self {
        Self::compare(field, "ne", value)
    }

    pub fn gt(field: &str, value: impl Into<Literal>) -> Self {
        Self::compare(field, "gt", value)
    }

    pub fn ge(field: &str, value: impl Into<Literal>) -> Self {
        Self::compare(field, "ge", value)
    }

    pub fn lt(field: &str, value: impl Into<Literal>) -> Self {
        Self::compare(field, "lt", value)
    }

    pub fn le(field: &str, value: impl Into<Literal>) -> Self {
        Self::compare(field, "le", value)
    }

    pub fn and(self, other: Filter) -> Self {
        Filter(format!("{} and {}", self.0, other.0))
    }

    /// `or` binds looser than `and`, so the result is parenthesized.
    pub fn or(self, other: Filter) -> Self {
        Filter(format!("({} or {})", self.0, other.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ODataQuery {
    filter: Option<Filter>,
    select: Vec<String>,
    top: Option<u32>,
    order_by: Option<String>,
}

impl ODataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn order_by(mut self, expression: impl Into<String>) -> Self {
        self.order_by = Some(expression.into());
        self
    }

    /// Query parameters in the order `$filter`, `$select`, `$top`, `$orderby`.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(ref filter) = self.filter {
            pairs.push(("$filter".to_string(), filter.to_string()));
        }
        if !self.select.is_empty() {
            pairs.push(("$select".to_string(), self.select.join(",")));
        }
        if let Some(top) = self.top {
            pairs.push(("$top".to_string(), top.to_string()));
        }
        if let Some(ref order_by) = self.order_by {
            pairs.push(("$orderby".to_string(), order_by.clone()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_literals_are_quoted_and_escaped() {
        assert_eq!(Filter::eq("user_email", "jane@acme.com").as_str(), "user_email eq 'jane@acme.com'");
        assert_eq!(Filter::eq("user_ref", "O'Brien").as_str(), "user_ref eq 'O''Brien'");
    }

    #[test]
    fn test_numbers_dates_and_raw_values() {
        assert_eq!(Filter::eq("user_id", 42i64).as_str(), "user_id eq 42");
        let start = NaiveDate::from_ymd_opt(2020, 12, 12).unwrap();
        assert_eq!(Filter::ge("lo_start_dt", start).as_str(), "lo_start_dt ge 2020-12-12");
        assert_eq!(
            Filter::eq("lo_object_id", Literal::Raw("d83c81e2-9c64-43cc-bedf-a0069e2a69e1".to_string())).as_str(),
            "lo_object_id eq d83c81e2-9c64-43cc-bedf-a0069e2a69e1"
        );
    }

    #[test]
    fn test_combinators_keep_precedence() {
        let active = Filter::eq("user_status_id", 1i64);
        let either = Filter::eq("user_ou_id", 7i64).or(Filter::eq("user_ou_id", 8i64));
        assert_eq!(
            active.and(either).as_str(),
            "user_status_id eq 1 and (user_ou_id eq 7 or user_ou_id eq 8)"
        );
    }

    #[test]
    fn test_query_pairs() {
        let query = ODataQuery::new()
            .filter(Filter::eq("user_id", 1i64))
            .select(["user_id", "user_email"])
            .top(10)
            .order_by("user_id desc");
        assert_eq!(
            query.to_pairs(),
            vec![
                ("$filter".to_string(), "user_id eq 1".to_string()),
                ("$select".to_string(), "user_id,user_email".to_string()),
                ("$top".to_string(), "10".to_string()),
                ("$orderby".to_string(), "user_id desc".to_string()),
            ]
        );
        assert!(ODataQuery::new().to_pairs().is_empty());
    }
}
