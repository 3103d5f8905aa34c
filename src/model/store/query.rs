use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use mongodb::bson::{Bson, Document};

/// The tables an election deployment keeps.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum Table {
    Elections,
    Candidates,
    Votes,
    Admins,
}

impl Table {
    /// The name of the table (or collection) in the backing store.
    pub fn name(self) -> &'static str {
        match self {
            Table::Elections => "elections",
            Table::Candidates => "candidates",
            Table::Votes => "votes",
            Table::Admins => "admins",
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A uniqueness constraint the store must enforce on writes.
///
/// If `partial` is set, only rows where that boolean column holds the given
/// value take part in the constraint.
#[derive(Debug, Copy, Clone)]
pub struct UniqueIndex {
    pub table: Table,
    pub keys: &'static [&'static str],
    pub partial: Option<(&'static str, bool)>,
}

impl UniqueIndex {
    /// Does this constraint cover the given row?
    pub fn covers(&self, row: &Document) -> bool {
        match self.partial {
            Some((field, value)) => row.get_bool(field).map_or(false, |v| v == value),
            None => true,
        }
    }

    /// The values of the indexed columns in the given row.
    pub fn key_of<'a>(&self, row: &'a Document) -> Vec<Option<&'a Bson>> {
        self.keys.iter().map(|key| row.get(key)).collect()
    }

    /// Human-readable name, used in error messages.
    pub fn describe(&self) -> String {
        format!("{}({})", self.table, self.keys.join(", "))
    }
}

/// Every uniqueness constraint of the schema. These push the
/// "one ongoing election" and "one vote per voter" rules down into the store,
/// so racing writers cannot both succeed.
pub const UNIQUE_INDEXES: [UniqueIndex; 4] = [
    UniqueIndex {
        table: Table::Elections,
        keys: &["id"],
        partial: None,
    },
    UniqueIndex {
        table: Table::Elections,
        keys: &["ongoing"],
        partial: Some(("ongoing", true)),
    },
    UniqueIndex {
        table: Table::Votes,
        keys: &["cnic", "election_id"],
        partial: None,
    },
    UniqueIndex {
        table: Table::Admins,
        keys: &["username"],
        partial: None,
    },
];

/// A conjunction of column equality tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Bson)>,
}

impl Filter {
    /// A filter matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Shorthand for `Filter::all().eq(field, value)`.
    pub fn by(field: &str, value: impl Into<Bson>) -> Self {
        Self::all().eq(field, value)
    }

    /// Additionally require `field == value`.
    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    /// Does the given row satisfy every condition?
    pub fn matches(&self, row: &Document) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            row.get(field)
                .map_or(false, |actual| bson_equal(actual, expected))
        })
    }

    /// Render as a MongoDB query document.
    pub fn to_document(&self) -> Document {
        self.conditions
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }
}

/// Sort order on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub descending: bool,
}

/// A `select` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub order: Option<Order>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn newest_first(mut self, field: &str) -> Self {
        self.order = Some(Order {
            field: field.to_string(),
            descending: true,
        });
        self
    }

    pub fn oldest_first(mut self, field: &str) -> Self {
        self.order = Some(Order {
            field: field.to_string(),
            descending: false,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the ordering as a MongoDB sort document.
    pub fn sort_document(&self) -> Option<Document> {
        self.order.as_ref().map(|order| {
            let direction = if order.descending { -1 } else { 1 };
            let mut sort = Document::new();
            sort.insert(order.field.clone(), direction);
            sort
        })
    }
}

/// Numeric width is an encoding detail; `Int32(3)` and `Int64(3)` are the same value.
fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Value equality the way the database compares filter values.
pub fn bson_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Total order over the column types the schema uses. Missing values and
/// nulls sort first, mirroring MongoDB.
pub fn bson_cmp(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    fn rank(value: Option<&Bson>) -> u8 {
        match value {
            None | Some(Bson::Null) => 0,
            Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => 1,
            Some(Bson::String(_)) => 2,
            Some(Bson::Boolean(_)) => 3,
            Some(Bson::DateTime(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(x), Some(y)) => match (as_number(x), as_number(y)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => match (x, y) {
                (Bson::String(x), Bson::String(y)) => x.cmp(y),
                (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
                (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
                _ => rank(a).cmp(&rank(b)),
            },
        },
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mongodb::bson::doc;

    #[test]
    fn filter_matches_across_integer_widths() {
        let row = doc! { "election_id": 7_i32, "cnic": "12345" };
        assert!(Filter::by("election_id", 7_i64).matches(&row));
        assert!(Filter::by("election_id", 7_i64)
            .eq("cnic", "12345")
            .matches(&row));
        assert!(!Filter::by("election_id", 7_i64)
            .eq("cnic", "54321")
            .matches(&row));
        assert!(!Filter::by("missing", true).matches(&row));
        assert!(Filter::all().matches(&row));
    }

    #[test]
    fn filter_renders_as_query_document() {
        let filter = Filter::by("id", 3_i64).eq("ongoing", false);
        assert_eq!(filter.to_document(), doc! { "id": 3_i64, "ongoing": false });
    }

    #[test]
    fn query_renders_sort_document() {
        let query = Query::new(Filter::all()).newest_first("created_at").limit(1);
        assert_eq!(query.sort_document(), Some(doc! { "created_at": -1 }));
        assert_eq!(query.limit, Some(1));
        assert_eq!(Query::new(Filter::all()).sort_document(), None);
    }

    #[test]
    fn partial_index_only_covers_matching_rows() {
        let ongoing = &UNIQUE_INDEXES[1];
        assert!(ongoing.covers(&doc! { "ongoing": true }));
        assert!(!ongoing.covers(&doc! { "ongoing": false }));
        assert!(UNIQUE_INDEXES[0].covers(&doc! { "ongoing": false }));
    }

    #[test]
    fn ordering_puts_nulls_first() {
        let one = Bson::Int64(1);
        let two = Bson::Int32(2);
        assert_eq!(bson_cmp(Some(&one), Some(&two)), Ordering::Less);
        assert_eq!(bson_cmp(None, Some(&one)), Ordering::Less);
        assert_eq!(bson_cmp(Some(&Bson::Null), None), Ordering::Equal);
    }
}
