//! Rendering a full run.

use kubeguard::catalog::Catalog;
use kubeguard::config::AuditConfig;
use kubeguard::report::AuditReport;
use kubeguard::runner::Runner;
use kubeguard::types::{Shortfall, Verdict};

use async_trait::async_trait;
use kubeguard::catalog::Control;
use kubeguard::evidence::resolver::ResolveControl;

struct AlwaysFails;

#[async_trait]
impl ResolveControl for AlwaysFails {
    async fn resolve(&self, control: &Control) -> Verdict {
        Shortfall::Fail.verdict(format!("{} not satisfied", control.id))
    }
}

#[tokio::test]
async fn text_report_lists_every_control_once() {
    let catalog = Catalog::cis_v1_9().expect("catalog").only_chapter("4");
    let total = catalog.len();
    let runner = Runner::new(catalog, AuditConfig::default(), AlwaysFails);
    let report = AuditReport::collect(runner.run_all().collect_all().await);
    let text = report.to_text();

    let control_lines = text
        .lines()
        .filter(|l| l.starts_with("FAIL: 4.") || l.starts_with("INFO: 4."))
        .count();
    assert_eq!(control_lines, total);
    assert!(text.contains("FAIL: 4.2.1 Ensure that the --anonymous-auth argument is set to false"));
    assert!(text.contains("audit: /etc/kubernetes/pki/ca.crt"));
    assert!(text.lines().last().is_some_and(|l| l.starts_with("== Summary: 0 PASS, ")));
    assert!(report.has_automated_failure());
}

#[tokio::test]
async fn json_report_round_trips_through_serde_json() {
    let catalog = Catalog::cis_v1_9().expect("catalog").only_chapter("5");
    let runner = Runner::new(catalog, AuditConfig::default(), AlwaysFails);
    let report = AuditReport::collect(runner.run_all().collect_all().await);
    let value: serde_json::Value =
        serde_json::from_str(&report.to_json().expect("serialize")).expect("valid json");

    let results = value["results"].as_array().expect("results array");
    assert_eq!(results.len(), report.results.len());
    assert_eq!(results[0]["id"], "5.1.1");
    assert_eq!(results[0]["verdict"], "FAIL");
    assert_eq!(value["summary"]["fail"], report.summary.fail);
    assert!(
        chrono::DateTime::parse_from_rfc3339(value["generated_at"].as_str().expect("timestamp"))
            .is_ok()
    );
}
