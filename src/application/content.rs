use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::application::catalog::{templates, ReportCatalog};
use crate::domain::{
    definition::ReportDefinition,
    error::ReportError,
    report::{render_cell, Report, RowMap},
};
use crate::infrastructure::config::ServerConfig;

/// Name accepted by `--only` for the content summary.
pub const CONTENT_REPORT: &str = "content_report";

/// One single-row count query of the content summary.
struct CountQuery {
    name: &'static str,
    columns: &'static [&'static str],
    query: &'static str,
}

impl CountQuery {
    fn definition(&self) -> ReportDefinition {
        ReportDefinition::new(self.name, self.query)
            .with_columns(self.columns)
            .without_diff()
    }
}

const COUNT_QUERIES: &[CountQuery] = &[
    // ontology
    CountQuery {
        name: "all_terms",
        columns: &["parts", "pubs"],
        query: "MATCH (c:Class) WHERE c.short_form =~ 'FBbt.+' \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS parts, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "all_nervous_system",
        columns: &["parts", "pubs"],
        query: "MATCH (c:Nervous_system) WHERE c.short_form =~ 'FBbt.+' \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS parts, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "all_neurons",
        columns: &["neurons", "pubs"],
        query: "MATCH (c:Class:Neuron) WHERE c.short_form =~ 'FBbt.+' \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS neurons, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "provisional_neurons",
        columns: &["neurons", "pubs"],
        query: "MATCH (c:Class:Neuron) WHERE c.short_form =~ 'FBbt[_]2.+' \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS neurons, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "characterised_neurons",
        columns: &["neurons", "pubs"],
        query: "MATCH (c:Class:Neuron) WHERE NOT c.short_form =~ 'FBbt[_]2.+' \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS neurons, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "synaptic_neuropils",
        columns: &["regions", "pubs"],
        query: "MATCH (c:Synaptic_neuropil) WHERE c.short_form =~ 'FBbt.+' \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS regions, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "neuron_projection_bundles",
        columns: &["regions", "pubs"],
        query: "MATCH (c:Neuron_projection_bundle) WHERE c.short_form =~ 'FBbt.+' \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS regions, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "cell_body_rinds",
        columns: &["regions", "pubs"],
        query: "MATCH (c:Class)-[:SUBCLASSOF*1..2]->(b:Class) \
                WHERE c.short_form =~ 'FBbt.+' AND b.short_form = 'FBbt_00100200' \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS regions, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "all_regions",
        columns: &["regions", "pubs"],
        query: "MATCH (c:Class) WHERE c.short_form =~ 'FBbt.+' \
                AND (ANY(x IN ['Synaptic_neuropil', 'Neuron_projection_bundle', 'Ganglion', \
                'Neuromere'] WHERE x in labels(c)) \
                OR ((c)-[:SUBCLASSOF]->(:Class {short_form:'FBbt_00100200'}))) \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS regions, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "sense_organs",
        columns: &["types", "pubs"],
        query: "MATCH (c:Class)-[:SUBCLASSOF*]->(b:Class) \
                WHERE c.short_form =~ 'FBbt.+' AND b.short_form = 'FBbt_00005155' \
                WITH c OPTIONAL MATCH (c)-[]->(p:pub) \
                RETURN COUNT(DISTINCT c) AS types, COUNT(DISTINCT p) AS pubs",
    },
    CountQuery {
        name: "non_isa_relationships",
        columns: &["total"],
        query: "MATCH (c:Class)-[r]->(d:Class) WHERE c.short_form =~ 'FBbt.+' \
                AND (r.type = 'Related') RETURN COUNT(DISTINCT r) AS total",
    },
    CountQuery {
        name: "isa_relationships",
        columns: &["total"],
        query: "MATCH (c:Class)-[r]->(d:Class) WHERE c.short_form =~ 'FBbt.+' \
                AND (type(r) = 'SUBCLASSOF') RETURN COUNT(DISTINCT r) AS total",
    },
    CountQuery {
        name: "all_relationships",
        columns: &["total"],
        query: "MATCH (c:Class)-[r]->(d:Class) WHERE c.short_form =~ 'FBbt.+' \
                AND ((r.type = 'Related') OR (type(r) = 'SUBCLASSOF')) \
                RETURN COUNT(DISTINCT r) AS total",
    },
    CountQuery {
        name: "ns_non_isa_relationships",
        columns: &["total"],
        query: "MATCH (c:Nervous_system)-[r]->(d:Class) WHERE c.short_form =~ 'FBbt.+' \
                AND (r.type = 'Related') RETURN COUNT(DISTINCT r) AS total",
    },
    CountQuery {
        name: "ns_isa_relationships",
        columns: &["total"],
        query: "MATCH (c:Nervous_system)-[r]->(d:Class) WHERE c.short_form =~ 'FBbt.+' \
                AND (type(r) = 'SUBCLASSOF') RETURN COUNT(DISTINCT r) AS total",
    },
    CountQuery {
        name: "ns_all_relationships",
        columns: &["total"],
        query: "MATCH (c:Nervous_system)-[r]->(d:Class) WHERE c.short_form =~ 'FBbt.+' \
                AND ((r.type = 'Related') OR (type(r) = 'SUBCLASSOF')) \
                RETURN COUNT(DISTINCT r) AS total",
    },
    // images, hemibrain 1.0.1 excluded
    CountQuery {
        name: "all_images",
        columns: &["images", "ds"],
        query: "MATCH (i:Individual:has_image)-[]->(n:DataSet) \
                WHERE n.production AND n.short_form<>\"Xu2020Neurons\" \
                RETURN COUNT(DISTINCT i) AS images, COUNT(DISTINCT n) AS ds",
    },
    CountQuery {
        name: "single_neuron_images",
        columns: &["images", "types"],
        query: "MATCH (n:DataSet)<-[]-(i:Individual:Neuron:has_image)-[:INSTANCEOF]->(c:Class:Neuron) \
                WHERE n.production AND n.short_form<>\"Xu2020Neurons\" \
                RETURN COUNT(DISTINCT i) AS images, COUNT(DISTINCT c) AS types",
    },
    CountQuery {
        name: "exp_pattern_images",
        columns: &["images", "drivers"],
        query: "MATCH (n:DataSet)<-[]-(i:Individual:Expression_pattern:has_image)-\
                [:INSTANCEOF]->(c:Class:Expression_pattern) \
                WHERE n.production \
                RETURN COUNT(DISTINCT i) AS images, COUNT(DISTINCT c) AS drivers",
    },
    CountQuery {
        name: "split_images",
        columns: &["images", "split_classes"],
        query: "MATCH (n:DataSet)<-[]-(i:Split:has_image)-[:INSTANCEOF]->(c:Class:Split) \
                WHERE n.production \
                RETURN COUNT(DISTINCT i) AS images, COUNT(DISTINCT c) AS split_classes",
    },
    CountQuery {
        name: "exp_pattern_fragment_images",
        columns: &["images", "drivers"],
        query: "MATCH (n:DataSet)<-[]-(i:Individual:Expression_pattern_fragment:has_image)-\
                [:part_of]->(c:Class:Expression_pattern) \
                WHERE n.production \
                RETURN COUNT(DISTINCT i) AS images, COUNT(DISTINCT c) AS drivers",
    },
    // annotations
    CountQuery {
        name: "driver_anatomy_annotations",
        columns: &["EPs", "annotations", "anatomy"],
        query: "MATCH p=(ep:Class:Expression_pattern)<-[r:part_of|overlaps]-(j:Individual)-\
                [:INSTANCEOF]->(n:Class) \
                WHERE EXISTS(r.pub) AND n.short_form =~ 'FBbt.+' \
                RETURN COUNT(DISTINCT ep) AS EPs, COUNT(r) AS annotations, \
                COUNT(DISTINCT n) AS anatomy",
    },
    CountQuery {
        name: "driver_ns_annotations",
        columns: &["EPs", "annotations", "anatomy"],
        query: "MATCH p=(ep:Class:Expression_pattern)<-[r:part_of|overlaps]-(j:Individual)-\
                [:INSTANCEOF]->(n:Nervous_system:Class) \
                WHERE EXISTS(r.pub) AND n.short_form =~ 'FBbt.+' \
                RETURN COUNT(DISTINCT ep) AS EPs, COUNT(r) AS annotations, \
                COUNT(DISTINCT n) AS anatomy",
    },
    CountQuery {
        name: "driver_neuron_annotations",
        columns: &["EPs", "annotations", "neurons"],
        query: "MATCH p=(ep:Class:Expression_pattern)<-[r:part_of]-(j:Individual)-\
                [:INSTANCEOF]->(n:Neuron:Class) \
                WHERE EXISTS(r.pub) AND n.short_form =~ 'FBbt.+' \
                RETURN COUNT(DISTINCT ep) AS EPs, COUNT(r) AS annotations, \
                COUNT(DISTINCT n) AS neurons",
    },
    CountQuery {
        name: "split_neuron_annotations",
        columns: &["Splits", "annotations", "neurons"],
        query: "MATCH p=(split:Class:Split)<-[r:part_of]-(j:Individual)-\
                [:INSTANCEOF]->(n:Neuron:Class) \
                WHERE EXISTS(r.pub) AND n.short_form =~ 'FBbt.+' \
                RETURN COUNT(DISTINCT split) AS Splits, COUNT(r) AS annotations, \
                COUNT(DISTINCT n) AS neurons",
    },
    // connectivity
    CountQuery {
        name: "neuron_connections",
        columns: &["neurons", "connections"],
        query: "MATCH (i:Individual:Neuron)-[r:synapsed_to]->(j:Individual:Neuron) \
                WITH COLLECT(r) AS rels, COLLECT(DISTINCT i) AS ci, COLLECT(DISTINCT j) AS cj \
                RETURN SIZE(apoc.coll.union(ci,cj)) AS neurons, SIZE(rels) AS connections",
    },
    CountQuery {
        name: "region_connections",
        columns: &["neurons", "regions", "connections"],
        query: "MATCH (n:Individual:Neuron)-\
                [r:has_presynaptic_terminals_in|has_postsynaptic_terminal_in]->(m:Individual) \
                RETURN COUNT(DISTINCT n) AS neurons, COUNT(DISTINCT m) AS regions, \
                COUNT(DISTINCT r) AS connections",
    },
    CountQuery {
        name: "muscle_connections",
        columns: &["neurons", "muscles", "connections"],
        query: "MATCH (n:Neuron)-[r:synapsed_to|synapsed_via_type_Is_bouton_to|\
                synapsed_via_type_Ib_bouton_to|synapsed_via_type_II_bouton_to|\
                synapsed_via_type_III_bouton_to]->(m:Muscle) \
                WITH n, r, m OPTIONAL MATCH (n2:Neuron)-[:SUBCLASSOF*]->(n) \
                WITH COLLECT(DISTINCT r) AS rels, COLLECT(DISTINCT n) AS cn, \
                COLLECT(DISTINCT n2) AS cn2, COLLECT(DISTINCT m) AS cm \
                RETURN SIZE(apoc.coll.union(cn,cn2)) AS neurons, \
                SIZE(cm) AS muscles, SIZE(rels) AS connections",
    },
    CountQuery {
        name: "sensory_connections",
        columns: &["neurons", "sense_organs", "connections"],
        query: "MATCH (n:Neuron)-[r:has_sensory_dendrite_in]->(s:Sense_organ) \
                WITH n, r, s OPTIONAL MATCH (n2:Neuron)-[:SUBCLASSOF*]->(n) \
                WITH COLLECT(DISTINCT r) AS rels, COLLECT(DISTINCT n) AS cn, \
                COLLECT(DISTINCT n2) AS cn2, COLLECT(DISTINCT s) AS cs \
                RETURN SIZE(apoc.coll.union(cn,cn2)) AS neurons, \
                SIZE(cs) AS sense_organs, SIZE(rels) AS connections",
    },
];

/// Amount of content on one server: the single-row counts above plus the
/// per-template table.
#[derive(Debug, Clone)]
pub struct ContentReport {
    pub server: String,
    pub endpoint: String,
    pub generated_at: DateTime<Utc>,
    counts: BTreeMap<&'static str, Report>,
    pub templates: Report,
}

impl ContentReport {
    /// Rendered value of `column` in the count query `query`; `n/a` when the
    /// query returned no row.
    pub fn count(&self, query: &str, column: &str) -> String {
        self.counts
            .get(query)
            .and_then(|r| r.scalar(column))
            .map(render_cell)
            .unwrap_or_else(|| "n/a".to_string())
    }

    /// The whole summary as one long table (`measure`, `column`, `value`),
    /// for fingerprinting and row counts. The timestamp is not part of it.
    pub fn as_table(&self) -> Report {
        let mut rows: Vec<RowMap> = Vec::new();
        for query in COUNT_QUERIES {
            for column in query.columns {
                rows.push(measure(query.name, column, self.count(query.name, column)));
            }
        }
        for row in self.templates.rows() {
            let template = row.get("template").map(render_cell).unwrap_or_default();
            for column in self.templates.columns().iter().filter(|c| *c != "template") {
                let value = row.get(column).map(render_cell).unwrap_or_default();
                rows.push(measure(&format!("template:{template}"), column, value));
            }
        }
        Report::new(
            &format!("{}_{}", self.server, CONTENT_REPORT),
            vec!["measure".into(), "column".into(), "value".into()],
            rows,
        )
    }
}

fn measure(name: &str, column: &str, value: String) -> RowMap {
    [
        ("measure".to_string(), Value::String(name.to_string())),
        ("column".to_string(), Value::String(column.to_string())),
        ("value".to_string(), Value::String(value)),
    ]
    .into()
}

/// Run every content query against `server`. The first failing query fails
/// the whole summary; a partial one is never produced.
pub async fn build_content_report(
    catalog: &ReportCatalog,
    server: &ServerConfig,
    generated_at: DateTime<Utc>,
) -> Result<ContentReport, ReportError> {
    let mut counts = BTreeMap::new();
    for query in COUNT_QUERIES {
        let report = catalog.try_generate(&query.definition(), server).await?;
        counts.insert(query.name, report);
    }
    let templates = catalog.try_generate(&templates(), server).await?;
    info!(server = %server.label, templates = templates.len(), "content report built");

    Ok(ContentReport {
        server: server.label.clone(),
        endpoint: server.endpoint.clone(),
        generated_at,
        counts,
        templates,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::ports::QueryExecutor;
    use crate::domain::report::Record;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    /// Answers every count query with one row where every count is `n`, and
    /// the templates query with one template.
    pub(crate) struct CountingExecutor {
        pub n: i64,
        /// Queries containing this text fail.
        pub fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        async fn execute(
            &self,
            server: &ServerConfig,
            query: &str,
        ) -> Result<Vec<Record>, ReportError> {
            if self.fail_on.is_some_and(|f| query.contains(f)) {
                return Err(ReportError::query(&server.label, "Unknown function 'apoc.coll.union'"));
            }
            let mut record = Record::new();
            if query.contains("t.label AS template") {
                record.insert("template".into(), json!("JRC2018Unisex"));
            }
            for name in [
                "parts", "pubs", "neurons", "regions", "types", "total", "images", "ds",
                "drivers", "split_classes", "EPs", "annotations", "anatomy", "Splits",
                "connections", "muscles", "sense_organs", "datasets", "single_neuron_images",
                "em_images", "expression_patterns", "split_images",
                "expression_pattern_fragments", "painted_domains", "label", "nodes",
            ] {
                record.insert(name.into(), json!(self.n));
            }
            Ok(vec![record])
        }
    }

    fn catalog(n: i64, fail_on: Option<&'static str>) -> ReportCatalog {
        ReportCatalog::with_definitions(Arc::new(CountingExecutor { n, fail_on }), vec![])
    }

    fn pdb() -> ServerConfig {
        ServerConfig::new("pdb", "http://pdb.example.org")
    }

    #[tokio::test]
    async fn counts_are_read_from_the_first_row() {
        let report = build_content_report(&catalog(7, None), &pdb(), Utc::now())
            .await
            .unwrap();
        assert_eq!(report.count("all_terms", "parts"), "7");
        assert_eq!(report.count("sensory_connections", "sense_organs"), "7");
        assert_eq!(report.count("all_terms", "nope"), "n/a");
        assert_eq!(report.templates.rows()[0]["template"], json!("JRC2018Unisex"));
    }

    #[tokio::test]
    async fn one_failing_query_fails_the_summary() {
        let err = build_content_report(&catalog(1, Some("apoc.coll.union")), &pdb(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "query");
    }

    #[tokio::test]
    async fn table_form_ignores_the_timestamp() {
        let a = build_content_report(&catalog(3, None), &pdb(), Utc::now()).await.unwrap();
        let b = build_content_report(&catalog(3, None), &pdb(), Utc::now()).await.unwrap();
        let c = build_content_report(&catalog(4, None), &pdb(), Utc::now()).await.unwrap();

        let table = a.as_table();
        assert_eq!(table.name(), "pdb_content_report");
        assert!(table
            .rows()
            .iter()
            .any(|r| r["measure"] == json!("template:JRC2018Unisex") && r["column"] == json!("images")));
        assert_eq!(
            crate::domain::fingerprint::fingerprint(&table),
            crate::domain::fingerprint::fingerprint(&b.as_table())
        );
        assert_ne!(
            crate::domain::fingerprint::fingerprint(&table),
            crate::domain::fingerprint::fingerprint(&c.as_table())
        );
    }
}
