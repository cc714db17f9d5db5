//! End-to-end tests of the built-in extensions, driven through the full
//! analysis pipeline.

use apidrift_analysis::AnalysisContext;
use apidrift_analysis::AnalysisDriver;
use apidrift_analysis::ApiAnalyzer;
use apidrift_analysis::ApiAnalyzerFactory;
use apidrift_analysis::BufferReporter;
use apidrift_analysis::Check;
use apidrift_analysis::CollectedReport;
use apidrift_analysis::ElementPair;
use apidrift_analysis::Extension;
use apidrift_analysis::PipelineConfig;
use apidrift_analysis::TreeFilter;
use apidrift_model::Api;
use apidrift_model::BytesArchive;
use apidrift_model::Compatibility;
use apidrift_model::Difference;
use apidrift_model::ElementKind;
use apidrift_model::Forest;
use apidrift_model::KindSet;
use apidrift_model::Severity;
use pretty_assertions::assert_eq;
use serde_json::json;

/// An analyzer building a forest from a literal description.
struct TreeAnalyzer {
    /// The forest builder.
    build: fn(&mut Forest),
}

impl Extension for TreeAnalyzer {
    fn extension_id(&self) -> Option<&str> {
        Some("test.tree")
    }
}

impl ApiAnalyzer for TreeAnalyzer {
    fn analyze(&mut self, _: &mut dyn TreeFilter) -> anyhow::Result<Forest> {
        let mut forest = Forest::new();
        (self.build)(&mut forest);
        Ok(forest)
    }
}

/// A factory creating [`TreeAnalyzer`]s, picking the builder by the name of
/// the API's first archive.
struct TreeAnalyzerFactory {
    /// The builder of the old forest.
    old: fn(&mut Forest),
    /// The builder of the new forest.
    new: fn(&mut Forest),
}

impl ApiAnalyzerFactory for TreeAnalyzerFactory {
    fn id(&self) -> &str {
        "test.tree"
    }

    fn create(&self, api: &Api, _: &AnalysisContext) -> anyhow::Result<Box<dyn ApiAnalyzer>> {
        let side = api
            .archives()
            .first()
            .map(|archive| archive.name().to_string())
            .unwrap_or_else(|| "old".to_string());
        let build = if side == "new" { self.new } else { self.old };
        Ok(Box::new(TreeAnalyzer { build }))
    }

    fn checks(&self, _: &AnalysisContext) -> anyhow::Result<Vec<Box<dyn Check>>> {
        Ok(vec![Box::new(AddRemoveCheck)])
    }
}

/// A check reporting added and removed elements.
struct AddRemoveCheck;

impl Extension for AddRemoveCheck {
    fn extension_id(&self) -> Option<&str> {
        Some("test.add-remove")
    }
}

impl Check for AddRemoveCheck {
    fn interest(&self) -> KindSet {
        KindSet::ALL
    }

    fn descend_on_non_existing(&self) -> bool {
        true
    }

    fn leave(&mut self, pair: &ElementPair<'_>) -> anyhow::Result<Vec<Difference>> {
        if pair.old.is_none() {
            Ok(vec![
                Difference::new("element.added", "element added")
                    .with_classification(Compatibility::Source, Severity::NonBreaking),
            ])
        } else if pair.new.is_none() {
            Ok(vec![
                Difference::new("element.removed", "element removed")
                    .with_classification(Compatibility::Source, Severity::Breaking),
            ])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Runs the pipeline with every built-in extension registered.
fn run(
    old: fn(&mut Forest),
    new: fn(&mut Forest),
    config: PipelineConfig,
) -> Vec<CollectedReport> {
    let mut driver = AnalysisDriver::builder(config)
        .with_analyzer(TreeAnalyzerFactory { old, new })
        .with_matchers(apidrift_basic::matchers())
        .with_filters(apidrift_basic::filters())
        .with_transforms(apidrift_basic::transforms())
        .with_old_api(Api::new().with_archive(BytesArchive::new("old", Vec::new())))
        .with_new_api(Api::new().with_archive(BytesArchive::new("new", Vec::new())))
        .build()
        .expect("the driver should build");

    let mut reporter = BufferReporter::new();
    driver
        .run(&mut [&mut reporter])
        .expect("the analysis run should succeed");
    driver.close();
    reporter.take_reports()
}

/// Flattens the difference codes of the given reports, in emission order.
fn codes(reports: &[CollectedReport]) -> Vec<String> {
    reports
        .iter()
        .flat_map(|report| report.differences.iter())
        .map(|difference| difference.code().to_string())
        .collect()
}

#[test]
fn ignore_drops_matched_differences() {
    fn old(forest: &mut Forest) {
        let calc = forest.add_root(ElementKind::Type, "Calc", "Calc", None);
        forest.add_child(calc, ElementKind::Method, "gone()", "Calc::gone()", None);
    }
    fn new(forest: &mut Forest) {
        forest.add_root(ElementKind::Type, "Calc", "Calc", None);
    }

    let config = PipelineConfig::new().with_configuration(
        "basic.ignore",
        json!([{"code": "element\\.removed", "justification": "dropped on purpose"}]),
    );
    let reports = run(old, new, config);
    assert_eq!(codes(&reports), Vec::<String>::new());
}

#[test]
fn ignore_honors_bound_element_expressions() {
    fn old(forest: &mut Forest) {
        let calc = forest.add_root(ElementKind::Type, "Calc", "Calc", None);
        forest.add_child(calc, ElementKind::Method, "kept()", "Calc::kept()", None);
        forest.add_child(calc, ElementKind::Method, "waived()", "Calc::waived()", None);
    }
    fn new(forest: &mut Forest) {
        forest.add_root(ElementKind::Type, "Calc", "Calc", None);
    }

    // Only the removal of `Calc::waived()` is ignored
    let config = PipelineConfig::new().with_configuration(
        "basic.ignore",
        json!([{"code": ".*", "old": "^Calc::waived"}]),
    );
    let reports = run(old, new, config);
    assert_eq!(codes(&reports), vec!["element.removed"]);

    let with_differences: Vec<_> = reports
        .iter()
        .filter(|report| !report.differences.is_empty())
        .collect();
    assert_eq!(with_differences[0].old.as_deref(), Some("Calc::kept()"));
}

#[test]
fn ignore_honors_the_exact_matcher() {
    fn old(forest: &mut Forest) {
        let calc = forest.add_root(ElementKind::Type, "Calc", "Calc", None);
        forest.add_child(calc, ElementKind::Method, "gone()", "Calc::gone()", None);
    }
    fn new(forest: &mut Forest) {
        forest.add_root(ElementKind::Type, "Calc", "Calc", None);
    }

    // The exact matcher does not treat the expression as a regex: a partial
    // representation does not match
    let partial = PipelineConfig::new().with_configuration(
        "basic.ignore",
        json!([{"code": ".*", "old": "Calc::gone", "matcher": "matcher.exact"}]),
    );
    assert_eq!(codes(&run(old, new, partial)), vec!["element.removed"]);

    let full = PipelineConfig::new().with_configuration(
        "basic.ignore",
        json!([{"code": ".*", "old": "Calc::gone()", "matcher": "matcher.exact"}]),
    );
    assert_eq!(codes(&run(old, new, full)), Vec::<String>::new());
}

#[test]
fn reclassify_overrides_classification_and_criticality() {
    fn old(forest: &mut Forest) {
        let calc = forest.add_root(ElementKind::Type, "Calc", "Calc", None);
        forest.add_child(calc, ElementKind::Method, "gone()", "Calc::gone()", None);
    }
    fn new(forest: &mut Forest) {
        forest.add_root(ElementKind::Type, "Calc", "Calc", None);
    }

    let config = PipelineConfig::new().with_configuration(
        "basic.reclassify",
        json!([{
            "code": "element\\.removed",
            "classify": {"source": "nonBreaking", "binary": "nonBreaking"},
            "criticality": "documented",
            "justification": "the method was never part of the supported surface"
        }]),
    );
    let reports = run(old, new, config);

    let difference = reports
        .iter()
        .flat_map(|report| report.differences.iter())
        .next()
        .expect("a difference should be reported");
    assert_eq!(difference.severity(Compatibility::Source), Some(Severity::NonBreaking));
    assert_eq!(difference.severity(Compatibility::Binary), Some(Severity::NonBreaking));
    assert_eq!(difference.criticality().unwrap().name(), "documented");
    assert!(difference.justification().is_some());
}

#[test]
fn include_exclude_filter_prunes_reports() {
    fn side(forest: &mut Forest) {
        forest.add_root(ElementKind::Type, "api.A", "api.A", None);
        forest.add_root(ElementKind::Type, "internal.B", "internal.B", None);
    }

    let config = PipelineConfig::new()
        .with_configuration("basic.filter", json!({"exclude": ["^internal\\."]}));
    let reports = run(side, side, config);

    let names: Vec<_> = reports
        .iter()
        .map(|report| report.old.clone().unwrap())
        .collect();
    assert_eq!(names, vec!["api.A"]);
}

#[test]
fn excluded_containers_still_expose_matching_children() {
    fn side(forest: &mut Forest) {
        let outer = forest.add_root(ElementKind::Type, "internal.Outer", "internal.Outer", None);
        forest.add_child(outer, ElementKind::Type, "api.Inner", "api.Inner", None);
    }

    let config = PipelineConfig::new()
        .with_configuration("basic.filter", json!({"exclude": ["^internal\\."]}));
    let reports = run(side, side, config);

    let names: Vec<_> = reports
        .iter()
        .map(|report| report.old.clone().unwrap())
        .collect();
    assert_eq!(names, vec!["api.Inner"]);
}
