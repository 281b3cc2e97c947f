//! Diesel models for the staging table.

use diesel::prelude::*;

use crate::schema;

/// A staged response row.
#[derive(Queryable, QueryableByName, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = schema::datadump)]
pub struct StagedRow {
    pub id: i32,
    pub url: String,
    pub service: String,
    pub method: String,
    pub request_header: Option<String>,
    pub response_body: Option<String>,
    pub response_header: Option<String>,
    pub parsed: bool,
    pub created_at: String,
}

/// New staged row for insertion. `parsed` takes its column default.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::datadump)]
pub struct NewStagedRow<'a> {
    pub url: &'a str,
    pub service: &'a str,
    pub method: &'a str,
    pub request_header: Option<&'a str>,
    pub response_body: Option<&'a str>,
    pub response_header: Option<&'a str>,
    pub created_at: &'a str,
}
