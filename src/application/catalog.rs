use std::sync::Arc;

use tracing::{debug, error, info};

use crate::application::table_builder::TableBuilder;
use crate::domain::{
    definition::ReportDefinition,
    error::ReportError,
    ports::QueryExecutor,
    report::{Record, Report},
};
use crate::infrastructure::config::{AppConfig, ServerConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Built-in definitions
// ─────────────────────────────────────────────────────────────────────────────

pub const DATASETS: &str = "datasets";
pub const DATASETS_PROD: &str = "datasets_prod";
pub const LABEL_COUNTS: &str = "label_counts";
pub const TEMPLATES: &str = "templates";

const DATASET_ANCHOR: &str = "MATCH (ds:DataSet) WITH ds ";

/// Every DataSet with its reference, license and number of individuals.
pub fn datasets() -> ReportDefinition {
    ReportDefinition::new(
        DATASETS,
        "MATCH (ds:DataSet) WITH ds \
         OPTIONAL MATCH (ds)-[:has_reference]->(p:pub) \
         WITH ds, p \
         OPTIONAL MATCH (ds)-[:has_license|license]->(l:License) \
         WITH ds, p, l \
         OPTIONAL MATCH (ds)<-[:has_source]-(i:Individual) \
         RETURN ds.short_form, ds.label, ds.production[0] AS `ds.production`, \
         l.label AS license, p.short_form AS pub, \
         count(i) AS individuals ORDER BY ds.short_form",
    )
    .with_columns(&[
        "ds.short_form",
        "ds.label",
        "ds.production",
        "pub",
        "license",
        "individuals",
    ])
    .with_production_filter(
        DATASET_ANCHOR,
        "MATCH (ds:DataSet) WITH ds WHERE ds.production[0] = true ",
    )
    .without_diff()
}

/// Production DataSets with curation counts; the report compared across
/// environments.
pub fn datasets_prod() -> ReportDefinition {
    ReportDefinition::new(
        DATASETS_PROD,
        "MATCH (ds:DataSet) WHERE ds.production[0] = true WITH ds \
         OPTIONAL MATCH (ds)-[:has_reference]->(p:pub) \
         WITH ds, p \
         OPTIONAL MATCH (a:Class)-[:has_reference]->(p) \
         WITH ds, p, count(distinct a) AS ontology_terms \
         OPTIONAL MATCH (:Individual)-[r:overlaps|part_of { pub: p.short_form}]->(:Expression_pattern) \
         WITH ds, p, ontology_terms, COUNT (distinct r) AS exp_cur \
         OPTIONAL MATCH (ds)-[]->(l:License) \
         WITH ds, p, exp_cur, ontology_terms, l \
         OPTIONAL MATCH (ds)<-[:has_source]-(i:Individual) \
         RETURN ds.short_form, ds.label, \
         l.label AS license, p.short_form AS pub, \
         count(distinct i) AS individuals, exp_cur, ontology_terms \
         ORDER BY ds.short_form",
    )
    .with_columns(&[
        "ds.short_form",
        "ds.label",
        "license",
        "pub",
        "individuals",
        "ontology_terms",
        "exp_cur",
    ])
}

/// Number of nodes carrying each graph label.
pub fn label_counts() -> ReportDefinition {
    ReportDefinition::new(
        LABEL_COUNTS,
        "MATCH (n) UNWIND labels(n) AS label \
         RETURN label, count(n) AS nodes ORDER BY label",
    )
    .with_columns(&["label", "nodes"])
}

/// Image, dataset and image-type counts per registration template.
pub fn templates() -> ReportDefinition {
    ReportDefinition::new(
        TEMPLATES,
        "MATCH (d:DataSet)<-[:has_source]-(i:Individual)<-[:depicts]-\
         (m:Individual)-[:in_register_with]->(:Template)-[:depicts]->(t:Template) \
         WHERE d.short_form<>\"Xu2020Neurons\" \
         OPTIONAL MATCH (m)-[:depicts]->(n:Individual:Neuron) \
         OPTIONAL MATCH em = (m)-[:is_specified_output_of]->(e) \
         WHERE e.label CONTAINS \"electron microscopy\" \
         OPTIONAL MATCH (m)-[:depicts]->(ep:Individual:Expression_pattern) \
         OPTIONAL MATCH (m)-[:depicts]->(epf:Individual:Expression_pattern_fragment) \
         OPTIONAL MATCH (m)-[:depicts]->(s:Individual:Expression_pattern:Split) \
         OPTIONAL MATCH pd = (m)-[:is_specified_output_of]->({label:\"computer graphic\"}) \
         RETURN DISTINCT t.label AS template, COUNT(DISTINCT m) AS images, \
         COUNT(DISTINCT d) AS datasets, \
         COUNT(DISTINCT n) AS single_neuron_images, \
         COUNT(DISTINCT em) AS em_images, \
         COUNT(DISTINCT ep) AS expression_patterns, \
         COUNT(DISTINCT s) AS split_images, \
         COUNT(DISTINCT epf) AS expression_pattern_fragments, \
         COUNT(DISTINCT pd) AS painted_domains",
    )
    .with_columns(&[
        "template",
        "images",
        "datasets",
        "single_neuron_images",
        "em_images",
        "expression_patterns",
        "split_images",
        "expression_pattern_fragments",
        "painted_domains",
    ])
}

/// Neurons cross-referenced to one external site, with their external IDs
/// and FBbt cell types. Named `<site>_ID_table`; never diffed.
pub fn id_table(site: &str) -> ReportDefinition {
    ReportDefinition::new(
        &format!("{site}_ID_table"),
        "MATCH (n:Neuron:Individual)-[d:database_cross_reference]->(s) \
         WHERE s.short_form = \"{{site}}\" \
         OPTIONAL MATCH (n)-[:INSTANCEOF]->(f:Class:Anatomy) \
         WHERE f.short_form STARTS WITH \"FBbt\" \
         RETURN DISTINCT n.short_form AS VFB_ID, d.accession AS external_IDs, \
         COLLECT(f.label) AS cell_types",
    )
    .bind("site", site)
    .with_columns(&["VFB_ID", "external_IDs", "cell_types"])
    .without_diff()
}

pub fn builtin_definitions() -> Vec<ReportDefinition> {
    vec![datasets(), datasets_prod(), label_counts(), templates()]
}

// ─────────────────────────────────────────────────────────────────────────────
// ReportCatalog
// ─────────────────────────────────────────────────────────────────────────────

/// Named report definitions plus the means to run them.
///
/// `try_generate` renders the query for one server, executes it and builds
/// the report. `generate` is the batch-friendly form: any failure is logged
/// and turned into `None` so the caller moves on to the next report.
pub struct ReportCatalog {
    executor: Arc<dyn QueryExecutor>,
    builder: TableBuilder,
    definitions: Vec<ReportDefinition>,
}

impl ReportCatalog {
    /// Catalog holding only the built-in definitions.
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self::with_definitions(executor, builtin_definitions())
    }

    pub fn with_definitions(
        executor: Arc<dyn QueryExecutor>,
        definitions: Vec<ReportDefinition>,
    ) -> Self {
        Self {
            executor,
            builder: TableBuilder::new(),
            definitions,
        }
    }

    /// Built-ins plus the config's `[[reports]]` (a configured report
    /// replaces a built-in of the same name), then one ID table per
    /// configured site, pinned to the ID table server.
    pub fn from_config(executor: Arc<dyn QueryExecutor>, cfg: &AppConfig) -> Self {
        let mut definitions: Vec<ReportDefinition> = builtin_definitions()
            .into_iter()
            .filter(|b| !cfg.reports.iter().any(|r| r.name == b.name))
            .collect();
        definitions.extend(cfg.reports.iter().cloned());
        if let Some(server) = cfg.id_table_server() {
            definitions.extend(
                cfg.id_tables
                    .sites
                    .iter()
                    .map(|site| id_table(site).on_servers(&[server])),
            );
        }
        Self::with_definitions(executor, definitions)
    }

    pub fn definitions(&self) -> &[ReportDefinition] {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<&ReportDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Keep only the named definitions (unknown names are ignored).
    pub fn retain(&mut self, names: &[String]) {
        self.definitions.retain(|d| names.iter().any(|n| n == &d.name));
    }

    /// Name of the report `definition` produces on `server`.
    pub fn report_name(definition: &ReportDefinition, server: &ServerConfig) -> String {
        format!("{}_{}", server.label, definition.name)
    }

    pub async fn try_generate(
        &self,
        definition: &ReportDefinition,
        server: &ServerConfig,
    ) -> Result<Report, ReportError> {
        let query = definition.render_query(&server.label, &server.rewrites)?;
        debug!(report = %definition.name, server = %server.label, "Executing: {}", query);

        let records = self.executor.execute(server, &query).await?;
        check_expected_fields(definition, server, &records)?;

        let name = Self::report_name(definition, server);
        Ok(self
            .builder
            .build(records, &name, definition.columns.as_deref()))
    }

    /// Library-facing form of [`try_generate`](Self::try_generate): the
    /// failure is logged and `None` returned. The batch runner uses
    /// `try_generate` to keep the typed error in its summary.
    pub async fn generate(
        &self,
        definition: &ReportDefinition,
        server: &ServerConfig,
    ) -> Option<Report> {
        match self.try_generate(definition, server).await {
            Ok(report) => {
                info!(report = %report.name(), rows = report.len(), "report generated");
                Some(report)
            }
            Err(e) => {
                error!(
                    report = %definition.name,
                    server = %server.label,
                    kind = e.kind(),
                    "report generation failed: {e}"
                );
                None
            }
        }
    }
}

/// A requested column that no record carries means the query and the column
/// order disagree; a missing value in some records is normal.
fn check_expected_fields(
    definition: &ReportDefinition,
    server: &ServerConfig,
    records: &[Record],
) -> Result<(), ReportError> {
    let Some(columns) = &definition.columns else {
        return Ok(());
    };
    if records.is_empty() {
        return Ok(());
    }
    let absent: Vec<&str> = columns
        .iter()
        .filter(|c| records.iter().all(|r| !r.contains_key(c.as_str())))
        .map(String::as_str)
        .collect();
    if absent.is_empty() {
        Ok(())
    } else {
        Err(ReportError::query(
            &server.label,
            format!(
                "report '{}': expected field(s) {:?} absent from every record",
                definition.name, absent
            ),
        ))
    }
}
