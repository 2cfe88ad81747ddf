use anyhow::Result;
use std::fmt::Write as FmtWrite;

use super::markdown::escape;
use crate::application::content::ContentReport;
use crate::domain::report::render_cell;

/// Ontology rows: label, count query, class column.
const ONTOLOGY_ROWS: &[(&str, &str, &str)] = &[
    ("All Terms", "all_terms", "parts"),
    ("All Nervous System Parts", "all_nervous_system", "parts"),
    ("All Neurons", "all_neurons", "neurons"),
    ("Characterised Neurons", "characterised_neurons", "neurons"),
    ("Provisional Neurons", "provisional_neurons", "neurons"),
    ("All Nervous System Regions", "all_regions", "regions"),
    ("Synaptic Neuropils", "synaptic_neuropils", "regions"),
    ("Neuron Projection Bundles", "neuron_projection_bundles", "regions"),
    ("Cell Body Rinds", "cell_body_rinds", "regions"),
    ("Sense Organs", "sense_organs", "types"),
];

/// Connectivity rows: neuron label, entity label, count query, entity column.
/// Neuron-to-neuron rows repeat the neuron count as the entity count.
const CONNECTIVITY_ROWS: &[(&str, &str, &str, &str)] = &[
    ("Any neuron (individuals)", "Any neuron (individuals)", "neuron_connections", "neurons"),
    ("Any neuron (individuals)", "Region (individuals)", "region_connections", "regions"),
    ("Any neuron (classes)", "Muscle (classes)", "muscle_connections", "muscles"),
    ("Any neuron (classes)", "Sense organ (classes)", "sensory_connections", "sense_organs"),
];

const TEMPLATE_HEADERS: &[(&str, &str)] = &[
    ("Template Name", "template"),
    ("Datasets", "datasets"),
    ("Images", "images"),
    ("Single Neurons", "single_neuron_images"),
    ("EM Neurons", "em_images"),
    ("Full Expression Patterns", "expression_patterns"),
    ("Split Expression Patterns", "split_images"),
    ("Partial Expression Patterns", "expression_pattern_fragments"),
    ("Painted domains", "painted_domains"),
];

/// Renders a server's content summary as Markdown.
pub fn render_content_report(report: &ContentReport) -> Result<String> {
    let c = |query: &str, column: &str| report.count(query, column);
    let mut md = String::new();

    writeln!(md, "# VFB Content Report {}", report.generated_at.format("%d/%m/%Y"))?;
    writeln!(md)?;
    writeln!(
        md,
        "Report of content found at `{}` on `{}`",
        report.endpoint,
        report.generated_at.format("%a, %d %b %Y %H:%M:%S UTC")
    )?;
    writeln!(md)?;

    writeln!(md, "## Ontology Content")?;
    writeln!(md)?;
    table_header(&mut md, &["Anatomy", "Classes", "Publications"])?;
    for &(label, query, column) in ONTOLOGY_ROWS {
        table_row(&mut md, &[label.to_string(), c(query, column), c(query, "pubs")])?;
    }
    writeln!(md)?;
    writeln!(
        md,
        "**{}** formal assertions, of which **{}** are SubClassOf assertions and **{}** are \
         other relationship types",
        c("all_relationships", "total"),
        c("isa_relationships", "total"),
        c("non_isa_relationships", "total")
    )?;
    writeln!(md)?;
    writeln!(
        md,
        "**{}** formal assertions on nervous system components, of which **{}** are \
         SubClassOf assertions and **{}** are other relationship types",
        c("ns_all_relationships", "total"),
        c("ns_isa_relationships", "total"),
        c("ns_non_isa_relationships", "total")
    )?;
    writeln!(md)?;

    writeln!(md, "## Image Content")?;
    writeln!(md)?;
    writeln!(md, "_(excludes hemibrain v1.0.1)_")?;
    writeln!(md)?;
    for (query, what, of, unit) in [
        ("all_images", "total images", "ds", "datasets"),
        ("single_neuron_images", "single neuron images", "types", "cell types"),
        ("exp_pattern_images", "images of expression patterns", "drivers", "drivers"),
        ("split_images", "images of expression patterns", "split_classes", "split combinations"),
        (
            "exp_pattern_fragment_images",
            "images of expression pattern fragments",
            "drivers",
            "drivers",
        ),
    ] {
        let prep = if query == "all_images" { "from" } else { "of" };
        writeln!(md, "- **{}** {what} {prep} **{}** {unit}", c(query, "images"), c(query, of))?;
    }
    writeln!(md)?;

    writeln!(md, "## Annotations")?;
    writeln!(md)?;
    for (query, counted, what, by) in [
        ("driver_anatomy_annotations", "anatomy", "types of anatomical structure", "EPs"),
        ("driver_ns_annotations", "anatomy", "parts of the nervous system", "EPs"),
        ("driver_neuron_annotations", "neurons", "types of neuron", "EPs"),
        ("split_neuron_annotations", "neurons", "types of neuron", "Splits"),
    ] {
        let lines = if by == "Splits" { "split combinations" } else { "driver lines" };
        writeln!(
            md,
            "- **{}** annotations recording **{}** {what} that **{}** specific {lines} are \
             expressed in.",
            c(query, "annotations"),
            c(query, counted),
            c(query, by)
        )?;
    }
    writeln!(md)?;

    writeln!(md, "## Connectivity")?;
    writeln!(md)?;
    table_header(
        &mut md,
        &["Neuron", "Number of Neurons", "Input/Output Entity", "Number of Entities", "Connections"],
    )?;
    for &(neuron, entity, query, column) in CONNECTIVITY_ROWS {
        table_row(
            &mut md,
            &[
                neuron.to_string(),
                c(query, "neurons"),
                entity.to_string(),
                c(query, column),
                c(query, "connections"),
            ],
        )?;
    }
    writeln!(md)?;

    writeln!(md, "## Content by Template")?;
    writeln!(md)?;
    writeln!(md, "_(excludes hemibrain v1.0.1)_")?;
    writeln!(md)?;
    if report.templates.is_empty() {
        writeln!(md, "_No templates._")?;
        return Ok(md);
    }
    let headers: Vec<&str> = TEMPLATE_HEADERS.iter().map(|(h, _)| *h).collect();
    table_header(&mut md, &headers)?;
    for row in report.templates.rows() {
        let cells: Vec<String> = TEMPLATE_HEADERS
            .iter()
            .map(|(_, column)| row.get(*column).map(render_cell).unwrap_or_default())
            .collect();
        table_row(&mut md, &cells)?;
    }

    Ok(md)
}

fn table_header(md: &mut String, headers: &[&str]) -> std::fmt::Result {
    writeln!(md, "| {} |", headers.join(" | "))?;
    writeln!(md, "|{}", " --- |".repeat(headers.len()))
}

fn table_row(md: &mut String, cells: &[String]) -> std::fmt::Result {
    let cells: Vec<String> = cells.iter().map(|c| escape(c)).collect();
    writeln!(md, "| {} |", cells.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::catalog::ReportCatalog;
    use crate::application::content::{build_content_report, tests::CountingExecutor};
    use crate::infrastructure::config::ServerConfig;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    async fn content(n: i64) -> ContentReport {
        let catalog =
            ReportCatalog::with_definitions(Arc::new(CountingExecutor { n, fail_on: None }), vec![]);
        let server = ServerConfig::new("pdb", "http://pdb.example.org");
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        build_content_report(&catalog, &server, at).await.unwrap()
    }

    #[tokio::test]
    async fn renders_every_section() {
        let md = render_content_report(&content(5).await).unwrap();

        assert!(md.starts_with("# VFB Content Report 01/03/2024\n"));
        assert!(md.contains("content found at `http://pdb.example.org`"));
        for section in [
            "## Ontology Content",
            "## Image Content",
            "## Annotations",
            "## Connectivity",
            "## Content by Template",
        ] {
            assert!(md.contains(section), "missing {section}");
        }
        assert!(md.contains("| Sense Organs | 5 | 5 |"));
        assert!(md.contains("**5** total images from **5** datasets"));
        assert!(md.contains("| Any neuron (classes) | 5 | Muscle (classes) | 5 | 5 |"));
        assert!(md.contains("| JRC2018Unisex | 5 | 5 | 5 | 5 | 5 | 5 | 5 | 5 |"));
    }

    #[tokio::test]
    async fn ontology_rows_keep_their_order() {
        let md = render_content_report(&content(1).await).unwrap();
        let positions: Vec<usize> = ONTOLOGY_ROWS
            .iter()
            .map(|(label, _, _)| md.find(&format!("| {label} |")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
