//! SPARQL query builders
//!
//! Every builder returns a complete query string. Values that end up inside
//! string literals go through [`escape_literal`]; IRIs are checked by the
//! caller with [`is_safe_iri`] before being interpolated.

use crate::resource::{NewResource, ResourceScope, Status, SIGNING_NS};

const PREFIXES: &str = "PREFIX sign: <http://mu.semte.ch/vocabularies/ext/signing/>
PREFIX dct: <http://purl.org/dc/terms/>
PREFIX mu: <http://mu.semte.ch/vocabularies/core/>
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>";

/// Base IRI of error records
pub const ERROR_IRI_BASE: &str = "http://lblod.info/blockchain/errors/";

/// Escape a value for use inside a double-quoted SPARQL literal
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Returns true if the value can be written between `<` and `>`
pub fn is_safe_iri(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\'))
}

fn type_filter(scope: ResourceScope) -> String {
    scope
        .types()
        .iter()
        .map(|t| format!("sign:{}", t.local_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resources in a status. Retry reads also bind the attached error node, one
/// row per error.
pub fn select_resources(status: Status, scope: ResourceScope) -> String {
    let with_error = status == Status::WaitingForRetry;
    let (error_var, error_pattern) = if with_error {
        (" ?hasError", "\n      ?resource sign:hasError ?hasError .")
    } else {
        ("", "")
    };

    format!(
        r#"{PREFIXES}
SELECT ?resource ?type ?content ?signatory ?secret ?timestamp ?subject{error_var}
       (GROUP_CONCAT(DISTINCT ?role; SEPARATOR = ",") AS ?roles)
WHERE {{
  GRAPH ?g {{
      ?resource a ?type ;
        sign:status <{status_iri}> .{error_pattern}
      OPTIONAL {{ ?resource sign:text ?content . }}
      OPTIONAL {{ ?resource sign:signatory ?signatory . }}
      OPTIONAL {{ ?resource sign:signatoryRoles ?role . }}
      OPTIONAL {{ ?resource sign:signatorySecret ?secret . }}
      OPTIONAL {{ ?resource dct:created ?timestamp . }}
      OPTIONAL {{ ?resource dct:subject ?subject . }}
      FILTER(?type IN ({types}))
  }}
}}
GROUP BY ?resource ?type ?content ?signatory ?secret ?timestamp ?subject{error_var}"#,
        status_iri = status.iri(),
        types = type_filter(scope),
    )
}

/// Replace the status of a resource
pub fn update_status(id: &str, status: Status) -> String {
    format!(
        r#"{PREFIXES}
DELETE {{
  GRAPH ?g {{ <{id}> sign:status ?status . }}
}} INSERT {{
  GRAPH ?g {{ <{id}> sign:status <{status_iri}> . }}
}} WHERE {{
  GRAPH ?g {{ <{id}> sign:status ?status . }}
}}"#,
        status_iri = status.iri(),
    )
}

/// Mark a resource published and record the hash of the content sent
pub fn update_published(id: &str, content_hash: &str) -> String {
    format!(
        r#"{PREFIXES}
DELETE {{
  GRAPH ?g {{ <{id}> sign:status ?status . }}
}} INSERT {{
  GRAPH ?g {{
    <{id}> sign:hashValue "{hash}" ;
      sign:status <{status_iri}> .
  }}
}} WHERE {{
  GRAPH ?g {{ <{id}> sign:status ?status . }}
}}"#,
        hash = escape_literal(content_hash),
        status_iri = Status::Published.iri(),
    )
}

/// Attach a new error record and move the resource to waiting-for-retry
pub fn insert_retry(id: &str, attempt: u32, error_uuid: &str, message: &str) -> String {
    format!(
        r#"{PREFIXES}
DELETE {{
  GRAPH ?g {{ <{id}> sign:status ?status . }}
}} INSERT {{
  GRAPH ?g {{
    <{id}> sign:hasError <{ERROR_IRI_BASE}{error_uuid}> ;
      sign:status <{status_iri}> .
    <{ERROR_IRI_BASE}{error_uuid}> a sign:BlockchainFailure ;
      sign:err "{message}" ;
      sign:count "{attempt}" ;
      mu:uuid "{origin}" .
  }}
}} WHERE {{
  GRAPH ?g {{ <{id}> sign:status ?status . }}
}}"#,
        status_iri = Status::WaitingForRetry.iri(),
        message = escape_literal(message),
        origin = escape_literal(id),
    )
}

/// Every error record
pub fn select_errors() -> String {
    format!(
        r#"{PREFIXES}
SELECT ?error ?err ?count ?origin
WHERE {{
  ?error a sign:BlockchainFailure ;
    sign:err ?err ;
    sign:count ?count ;
    mu:uuid ?origin .
}}"#
    )
}

/// Drop the status triple of a resource
pub fn delete_status(id: &str) -> String {
    format!(
        r#"{PREFIXES}
DELETE {{
  GRAPH ?g {{ <{id}> sign:status ?status . }}
}} WHERE {{
  GRAPH ?g {{ <{id}> sign:status ?status . }}
}}"#
    )
}

/// Drop the message of an error record, removing it from error reads
pub fn delete_error(error_id: &str) -> String {
    format!(
        r#"{PREFIXES}
DELETE {{
  GRAPH ?g {{ <{error_id}> sign:err ?err . }}
}} WHERE {{
  GRAPH ?g {{ <{error_id}> sign:err ?err . }}
}}"#
    )
}

/// Insert a fresh unpublished resource into the application graph
pub fn insert_resource(graph: &str, resource: &NewResource) -> String {
    let roles = resource
        .roles
        .iter()
        .map(|role| format!("      sign:signatoryRoles \"{}\" ;", escape_literal(role)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"{PREFIXES}
INSERT DATA {{
  GRAPH <{graph}> {{
    <{iri}> a <{SIGNING_NS}{type_name}> ;
      sign:text "{content}" ;
      sign:signatory <{signatory}> ;
{roles}
      sign:signatorySecret "{secret}" ;
      dct:subject <{subject}> ;
      dct:created "{created}"^^xsd:dateTime ;
      mu:uuid "{uuid}" ;
      sign:status <{status_iri}> .
  }}
}}"#,
        iri = resource.iri(),
        type_name = resource.resource_type.local_name(),
        content = escape_literal(&resource.content),
        signatory = resource.signatory,
        secret = escape_literal(&resource.secret),
        subject = resource.subject,
        created = escape_literal(&resource.created),
        uuid = escape_literal(&resource.uuid),
        status_iri = Status::Unpublished.iri(),
    )
}
