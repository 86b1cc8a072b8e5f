use serde::Deserialize;
use std::collections::HashMap;

use crate::graphql::query_alias;

/// Opaque server-assigned identifier of a data node.
pub type DataId = String;

/// Opaque server-assigned job handle.
pub type JobId = String;

/// A server-side record of processed content: a document, page, cropped
/// area, table or text fragment.
///
/// Core fields other than `id` are populated only when the node carries
/// them; aliased `datas(...)` sub-queries land in [`DataNode::children`]
/// keyed by query alias. Use [`DataNode::datas`] to look children up by the
/// originally requested tag or job name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataNode {
    pub id: DataId,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub table_csv: Option<String>,
    #[serde(default)]
    pub page_number: Option<i64>,
    #[serde(default)]
    pub page_indexes: Option<Vec<i64>>,
    #[serde(default)]
    pub polygon_relative_to_parent: Option<serde_json::Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub children: HashMap<String, Option<Vec<DataNode>>>,
}

impl DataNode {
    /// Child nodes returned for the given tag or job name, resolved through
    /// the same alias normalization the query used. Empty when the server
    /// returned nothing under that alias.
    #[must_use]
    pub fn datas(&self, requested: &str) -> &[DataNode] {
        self.children
            .get(&query_alias(requested))
            .and_then(Option::as_deref)
            .unwrap_or_default()
    }
}

/// Data reference inside a full-text search result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    pub id: DataId,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub page_number: Option<i64>,
    #[serde(default)]
    pub page_indexes: Option<Vec<i64>>,
}

/// One entry of the server's ranked full-text search response, passed
/// through without local re-ranking or filtering.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub data: SearchData,
    pub score: f64,
    pub value_count: i64,
    #[serde(default)]
    pub search_page_number: Option<i64>,
}

/// One row of the `getFinalTable` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalTableRow {
    #[serde(default)]
    pub parent_data_id: Option<DataId>,
    pub parent_data_file_name: String,
    #[serde(default)]
    pub tag_group: Option<String>,
    pub columns: Vec<FinalTableColumn>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalTableColumn {
    pub tag_name: String,
    #[serde(default)]
    pub data_text: Option<String>,
}

/// Pivot final-table rows into `file name -> tag name -> extracted text`.
///
/// Rows sharing a file name are last-write-wins: the later row replaces the
/// earlier one wholesale.
#[must_use]
pub fn pivot_final_table(rows: Vec<FinalTableRow>) -> HashMap<String, HashMap<String, String>> {
    let mut pivoted = HashMap::new();
    for row in rows {
        let columns = row
            .columns
            .into_iter()
            .map(|column| (column.tag_name, column.data_text.unwrap_or_default()))
            .collect();
        pivoted.insert(row.parent_data_file_name, columns);
    }
    pivoted
}
