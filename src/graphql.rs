use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    api::{ClientError, TotoClient},
    data::{pivot_final_table, DataNode, FinalTableRow, SearchHit},
    errors::{GraphFailure, RequestFailure},
};

const NODE_FIELDS: &str =
    "id\n    dataType\n    tableCsv\n    pageNumber\n    pageIndexes\n    polygonRelativeToParent\n    text";

const CHILD_FIELDS: &str =
    "id dataType pageNumber pageIndexes polygonRelativeToParent tableCsv text";

const SEARCH_QUERY: &str = "\
query Search($searchTerm: String!) {
  searchInTexts(searchTerm: $searchTerm) {
    data {
      id
      fileName
      dataType
      pageNumber
      pageIndexes
    }
    score
    valueCount
    searchPageNumber
  }
}";

const FINAL_TABLE_QUERY: &str = "\
query GetFinalTable($labelName: String!) {
  getFinalTable(labelName: $labelName) {
    parentDataId
    parentDataFileName
    tagGroup
    columns {
      tagName
      dataText
    }
  }
}";

/// Wire envelope for `POST /graphql`.
#[derive(Debug, Serialize)]
pub(crate) struct GraphQlRequest {
    pub query: String,
    pub variables: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Normalize a tag or job name into a valid GraphQL alias: every
/// non-alphanumeric byte becomes `_`, and a leading digit gets a `_`
/// prefix. Names are user data and cannot be bound as variables, so this is
/// the one place where request text is derived from input.
pub(crate) fn query_alias(name: &str) -> String {
    let mut alias: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    if alias.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        alias.insert(0, '_');
    }
    alias
}

/// Reserve an alias for a requested name, refusing two names that collapse
/// onto the same alias.
fn claim_alias(
    seen: &mut HashMap<String, String>,
    name: &str,
) -> Result<String, ClientError> {
    let alias = query_alias(name);
    match seen.insert(alias.clone(), name.to_owned()) {
        Some(first) => Err(ClientError::AliasCollision {
            alias,
            first,
            second: name.to_owned(),
        }),
        None => Ok(alias),
    }
}

/// Templated query for one data node plus an aliased `datas` sub-query per
/// requested tag and job name. Scalars are bound as GraphQL variables; two
/// names collapsing onto the same alias are rejected rather than merged.
fn build_get_data_query(
    data_id: &str,
    tags: &[&str],
    jobs: &[&str],
    tag_group: Option<&str>,
) -> Result<GraphQlRequest, ClientError> {
    let mut declarations = vec!["$dataId: String!".to_owned()];
    let mut variables = serde_json::Map::new();
    variables.insert("dataId".to_owned(), json!(data_id));

    if let Some(group) = tag_group {
        declarations.push("$tagGroup: String!".to_owned());
        variables.insert("tagGroup".to_owned(), json!(group));
    }

    let mut seen: HashMap<String, String> = HashMap::new();
    let mut body = String::new();
    for (index, tag) in tags.iter().enumerate() {
        let alias = claim_alias(&mut seen, tag)?;
        let variable = format!("t{index}");
        declarations.push(format!("${variable}: String!"));
        variables.insert(variable.clone(), json!(tag));

        let group_argument = if tag_group.is_some() {
            ", tagGroup: $tagGroup"
        } else {
            ""
        };
        body.push_str(&format!(
            "\n    {alias}: datas(tagName: ${variable}{group_argument}) {{ {CHILD_FIELDS} }}"
        ));
    }

    for (index, job) in jobs.iter().enumerate() {
        let alias = claim_alias(&mut seen, job)?;
        let variable = format!("j{index}");
        declarations.push(format!("${variable}: String!"));
        variables.insert(variable.clone(), json!(job));

        body.push_str(&format!(
            "\n    {alias}: datas(jobName: ${variable}) {{ {CHILD_FIELDS} }}"
        ));
    }

    let query = format!(
        "query GetData({declarations}) {{\n  data(dataId: $dataId) {{\n    {NODE_FIELDS}{body}\n  }}\n}}",
        declarations = declarations.join(", "),
    );

    Ok(GraphQlRequest {
        query,
        variables: Some(Value::Object(variables)),
    })
}

impl TotoClient {
    pub(crate) fn post_graphql(&self, request: &GraphQlRequest) -> Result<Value, ClientError> {
        let url = self.endpoint("graphql")?;
        debug!("posting graphql request to {url}");

        let response = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Query(RequestFailure::new(
                url,
                status,
                response.text()?,
            )));
        }

        let envelope: GraphQlEnvelope = response.json()?;
        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                return Err(ClientError::from(GraphFailure::new(
                    errors.into_iter().map(|e| e.message).collect(),
                )));
            }
        }

        envelope
            .data
            .ok_or_else(|| ClientError::from(GraphFailure::missing_field("data")))
    }

    fn graph_field<T: serde::de::DeserializeOwned>(
        data: &Value,
        field: &str,
    ) -> Result<T, ClientError> {
        let value = data
            .get(field)
            .cloned()
            .ok_or_else(|| ClientError::from(GraphFailure::missing_field(field)))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a data node's core fields plus, per requested tag or job name,
    /// the matching child nodes. Children are addressed on the result via
    /// [`DataNode::datas`] with the original name; `tag_group` narrows the
    /// tag sub-queries only.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::Query`] on a non-2xx response, with
    /// [`ClientError::Graph`] when the envelope carries field errors, and
    /// with [`ClientError::AliasCollision`] when two requested names
    /// normalize to the same alias.
    pub fn get_data(
        &self,
        data_id: &str,
        tags: Option<&[&str]>,
        jobs: Option<&[&str]>,
        tag_group: Option<&str>,
    ) -> Result<DataNode, ClientError> {
        let request = build_get_data_query(
            data_id,
            tags.unwrap_or_default(),
            jobs.unwrap_or_default(),
            tag_group,
        )?;
        let data = self.post_graphql(&request)?;
        Self::graph_field(&data, "data")
    }

    /// Full-text search over processed documents. The server's ranked list
    /// is returned as-is, without local re-ranking or filtering.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::Query`] or [`ClientError::Graph`] like any
    /// graph call.
    pub fn search_term(&self, term: &str) -> Result<Vec<SearchHit>, ClientError> {
        let request = GraphQlRequest {
            query: SEARCH_QUERY.to_owned(),
            variables: Some(json!({ "searchTerm": term })),
        };
        let data = self.post_graphql(&request)?;
        Self::graph_field(&data, "searchInTexts")
    }

    /// Fetch the final table for a label and pivot it into
    /// `file name -> tag name -> extracted text`. Rows sharing a file name
    /// are last-write-wins.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::Query`] or [`ClientError::Graph`] like any
    /// graph call.
    pub fn get_results(
        &self,
        label_name: &str,
    ) -> Result<HashMap<String, HashMap<String, String>>, ClientError> {
        let request = GraphQlRequest {
            query: FINAL_TABLE_QUERY.to_owned(),
            variables: Some(json!({ "labelName": label_name })),
        };
        let data = self.post_graphql(&request)?;
        let rows: Vec<FinalTableRow> = Self::graph_field(&data, "getFinalTable")?;
        Ok(pivot_final_table(rows))
    }

    /// Crop an area out of a parent image and OCR it in one server-side
    /// mutation, returning the recognised text node.
    ///
    /// The polygon is passed as its JSON literal. Arrays of numbers, the
    /// shape a polygon takes, serialize to valid GraphQL input syntax as-is;
    /// JSON objects would not (their keys are quoted) and are not accepted
    /// shapes here.
    ///
    /// # Errors
    ///
    /// As any graph call, plus [`ClientError::MissingOutput`] when the
    /// mutation reports no OCR output, and [`ClientError::NotSupported`]
    /// when the polygon is a JSON object.
    pub fn crop_image_and_ocr(
        &self,
        parent_data_id: &str,
        polygon: &Value,
    ) -> Result<DataNode, ClientError> {
        if polygon.is_object() {
            return Err(ClientError::NotSupported("object-shaped polygon"));
        }
        let query = format!(
            "mutation CropImageAndOcr($parentDataId: String!) {{\n  \
             cropImageAndOcr(parentDataId: $parentDataId, polygon: {polygon}) {{\n    \
             id\n    dataType\n    \
             crop_image_and_ocr: datas(jobName: \"crop_image_and_ocr\") {{ id dataType text }}\n  \
             }}\n}}",
            polygon = serde_json::to_string(polygon)?,
        );
        let request = GraphQlRequest {
            query,
            variables: Some(json!({ "parentDataId": parent_data_id })),
        };

        let data = self.post_graphql(&request)?;
        let node: DataNode = Self::graph_field(&data, "cropImageAndOcr")?;
        node.datas("crop_image_and_ocr")
            .first()
            .cloned()
            .ok_or(ClientError::MissingOutput("crop_image_and_ocr"))
    }
}
