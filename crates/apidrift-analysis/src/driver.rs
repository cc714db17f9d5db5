//! Implementation of the analysis driver.
//!
//! The driver ties the kernel together: it acquires archive analyzers for
//! both sides of the comparison, composes the tree filters of every filter
//! provider, walks the paired forests while dispatching checks and routing
//! raw differences through the transform pipeline, and finally emits one
//! report per matched pair to the reporters.

use std::sync::Arc;

use apidrift_model::Api;
use apidrift_model::Criticality;
use apidrift_model::CriticalitySet;
use apidrift_model::Difference;
use apidrift_model::Element;
use apidrift_model::ElementId;
use apidrift_model::ElementKind;
use apidrift_model::SeverityMapping;
use indexmap::IndexMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::AnalysisContext;
use crate::ApiAnalyzer;
use crate::ApiAnalyzerFactory;
use crate::Check;
use crate::CheckDispatcher;
use crate::ElementMatcher;
use crate::ElementPair;
use crate::Error;
use crate::FilterProvider;
use crate::ForestWalker;
use crate::MatchAll;
use crate::PairVisitor;
use crate::PipelineConfig;
use crate::Report;
use crate::Reporter;
use crate::Ternary;
use crate::Transform;
use crate::TransformPipeline;
use crate::TreeFilter;
use crate::filter::intersection;

/// The result of an analysis run.
///
/// The kernel exposes what a front-end needs to decide success: the maximum
/// criticality observed across every emitted difference and the list of
/// fatal per-element errors. Exit-code policy belongs to the front-end.
#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// The maximum criticality among all emitted differences.
    max_criticality: Option<Criticality>,
    /// The fatal per-element errors recorded during the walk.
    fatal_errors: Vec<Error>,
    /// The number of element pairs visited.
    pairs_visited: usize,
    /// The number of reports emitted to reporters.
    reports_emitted: usize,
}

impl AnalysisResult {
    /// Gets the maximum criticality among all emitted differences.
    pub fn max_criticality(&self) -> Option<&Criticality> {
        self.max_criticality.as_ref()
    }

    /// Gets the fatal per-element errors recorded during the walk.
    pub fn fatal_errors(&self) -> &[Error] {
        &self.fatal_errors
    }

    /// Gets the number of element pairs visited.
    pub fn pairs_visited(&self) -> usize {
        self.pairs_visited
    }

    /// Gets the number of reports emitted to reporters.
    pub fn reports_emitted(&self) -> usize {
        self.reports_emitted
    }

    /// Folds the criticalities of the given differences into the maximum.
    fn observe(&mut self, differences: &[Difference]) {
        for difference in differences {
            if let Some(criticality) = difference.criticality() {
                let higher = self
                    .max_criticality
                    .as_ref()
                    .is_none_or(|max| criticality > max);
                if higher {
                    self.max_criticality = Some(criticality.clone());
                }
            }
        }
    }
}

/// The analyzers of one admitted analyzer extension, one per side, plus the
/// checks of its format.
struct AnalyzerSides {
    /// The extension id of the analyzer.
    id: String,
    /// The analyzer bound to the old API.
    old: Box<dyn ApiAnalyzer>,
    /// The analyzer bound to the new API.
    new: Box<dyn ApiAnalyzer>,
    /// The checks to run over this analyzer's forests.
    checks: Vec<Box<dyn Check>>,
}

/// A builder for [`AnalysisDriver`].
pub struct AnalysisDriverBuilder {
    /// The pipeline configuration.
    config: PipelineConfig,
    /// The registered analyzer factories.
    analyzers: Vec<Box<dyn ApiAnalyzerFactory>>,
    /// The registered filter providers.
    filters: Vec<Box<dyn FilterProvider>>,
    /// The registered transforms.
    transforms: Vec<Box<dyn Transform>>,
    /// The registered element matchers.
    matchers: Vec<Box<dyn ElementMatcher>>,
    /// The old API.
    old_api: Api,
    /// The new API.
    new_api: Api,
    /// The cancellation token checked between element visits.
    cancellation: CancellationToken,
}

impl AnalysisDriverBuilder {
    /// Registers an archive analyzer factory.
    pub fn with_analyzer(mut self, factory: impl ApiAnalyzerFactory + 'static) -> Self {
        self.analyzers.push(Box::new(factory));
        self
    }

    /// Registers a filter provider.
    pub fn with_filter(mut self, filter: impl FilterProvider + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Registers a set of filter providers.
    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Box<dyn FilterProvider>>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Registers a transform.
    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Registers a set of transforms.
    pub fn with_transforms(mut self, transforms: impl IntoIterator<Item = Box<dyn Transform>>) -> Self {
        self.transforms.extend(transforms);
        self
    }

    /// Registers an element matcher.
    pub fn with_matcher(mut self, matcher: impl ElementMatcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    /// Registers a set of element matchers.
    pub fn with_matchers(mut self, matchers: impl IntoIterator<Item = Box<dyn ElementMatcher>>) -> Self {
        self.matchers.extend(matchers);
        self
    }

    /// Sets the old API of the comparison.
    pub fn with_old_api(mut self, api: Api) -> Self {
        self.old_api = api;
        self
    }

    /// Sets the new API of the comparison.
    pub fn with_new_api(mut self, api: Api) -> Self {
        self.new_api = api;
        self
    }

    /// Sets the cancellation token checked between element visits.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Validates the configuration and builds the driver.
    ///
    /// All configuration errors surface here, before any analysis begins:
    /// an unknown transform id in a block, an incomplete severity mapping,
    /// or a reference to an unknown criticality.
    pub fn build(self) -> Result<AnalysisDriver, Error> {
        let Self {
            config,
            analyzers,
            mut filters,
            mut transforms,
            matchers,
            old_api,
            new_api,
            cancellation,
        } = self;

        let criticalities = config.criticality_set()?;
        let mapping = config.validated_severity_mapping(&criticalities)?;

        let analyzers: Vec<Box<dyn ApiAnalyzerFactory>> = analyzers
            .into_iter()
            .filter(|factory| config.analyzers().admits(Some(factory.id())))
            .collect();

        // Matchers initialize first so every other extension can look them
        // up through its context
        let mut matcher_map: IndexMap<String, Arc<dyn ElementMatcher>> = IndexMap::new();
        for mut matcher in matchers {
            if !config.matchers().admits(matcher.extension_id()) {
                continue;
            }
            let Some(id) = matcher.extension_id().map(str::to_string) else {
                warn!("ignoring an element matcher without an extension id");
                continue;
            };
            let context = AnalysisContext::new(
                config.extensions().configuration_for(&id),
                criticalities.clone(),
                IndexMap::new(),
            );
            matcher
                .initialize(&context)
                .map_err(|source| Error::ExtensionInitialization {
                    id: id.clone(),
                    source,
                })?;
            matcher_map.insert(id, Arc::from(matcher));
        }

        filters.retain(|filter| config.filters().admits(filter.extension_id()));
        for filter in filters.iter_mut() {
            let context = extension_context(
                filter.extension_id(),
                &config,
                &criticalities,
                &matcher_map,
            );
            let id = filter.extension_id().unwrap_or("<anonymous>").to_string();
            filter
                .initialize(&context)
                .map_err(|source| Error::ExtensionInitialization { id, source })?;
        }

        transforms.retain(|transform| config.transforms().admits(transform.extension_id()));
        let mut transform_ids: IndexMap<String, usize> = IndexMap::new();
        for (index, transform) in transforms.iter().enumerate() {
            if let Some(id) = transform.extension_id() {
                if transform_ids.insert(id.to_string(), index).is_some() {
                    return Err(Error::ConfigurationInvalid {
                        reason: format!("duplicate transform extension id `{id}`"),
                    });
                }
            }
        }
        for transform in transforms.iter_mut() {
            let context = extension_context(
                transform.extension_id(),
                &config,
                &criticalities,
                &matcher_map,
            );
            let id = transform.extension_id().unwrap_or("<anonymous>").to_string();
            transform
                .initialize(&context)
                .map_err(|source| Error::ExtensionInitialization { id, source })?;
        }

        // Resolve the configured blocks to transform indices; transforms not
        // referenced anywhere each get an implicit block of their own
        let mut assigned = vec![false; transforms.len()];
        let mut block_indices: Vec<Vec<usize>> = Vec::new();
        for block in config.transform_blocks() {
            let mut indices = Vec::with_capacity(block.len());
            for id in block {
                let index = *transform_ids.get(id).ok_or_else(|| {
                    Error::ConfigurationInvalid {
                        reason: format!(
                            "unknown transform `{id}` referenced from a transform block"
                        ),
                    }
                })?;
                if assigned[index] {
                    return Err(Error::ConfigurationInvalid {
                        reason: format!("transform `{id}` referenced from more than one block"),
                    });
                }
                assigned[index] = true;
                indices.push(index);
            }
            block_indices.push(indices);
        }
        for (index, taken) in assigned.iter().enumerate() {
            if !taken {
                block_indices.push(vec![index]);
            }
        }

        let mut slots: Vec<Option<Box<dyn Transform>>> =
            transforms.into_iter().map(Some).collect();
        let blocks: Vec<Vec<Box<dyn Transform>>> = block_indices
            .into_iter()
            .map(|indices| {
                indices
                    .into_iter()
                    .map(|index| {
                        slots[index]
                            .take()
                            .expect("a transform should be assigned to exactly one block")
                    })
                    .collect()
            })
            .collect();
        let pipeline = TransformPipeline::new(blocks, config.transform_iteration_cap());

        Ok(AnalysisDriver {
            config,
            criticalities,
            mapping,
            analyzers,
            filters,
            matchers: matcher_map,
            pipeline,
            old_api,
            new_api,
            cancellation,
            sides: None,
        })
    }
}

/// Compares two versions of an API and reports the differences.
///
/// The driver's lifecycle is `open` (acquire analyzer resources), `run`
/// (analyze, walk, and report, possibly more than once), and `close`
/// (release resources). `close` is idempotent, safe to call after failures,
/// and also performed on drop.
pub struct AnalysisDriver {
    /// The pipeline configuration.
    config: PipelineConfig,
    /// The criticalities recognized within the run.
    criticalities: CriticalitySet,
    /// The validated severity-to-criticality mapping.
    mapping: SeverityMapping,
    /// The admitted analyzer factories.
    analyzers: Vec<Box<dyn ApiAnalyzerFactory>>,
    /// The admitted, initialized filter providers.
    filters: Vec<Box<dyn FilterProvider>>,
    /// The admitted, initialized element matchers.
    matchers: IndexMap<String, Arc<dyn ElementMatcher>>,
    /// The transform pipeline.
    pipeline: TransformPipeline,
    /// The old API.
    old_api: Api,
    /// The new API.
    new_api: Api,
    /// The cancellation token checked between element visits.
    cancellation: CancellationToken,
    /// The acquired analyzers, present between `open` and `close`.
    sides: Option<Vec<AnalyzerSides>>,
}

impl AnalysisDriver {
    /// Creates a builder for a driver with the given configuration.
    pub fn builder(config: PipelineConfig) -> AnalysisDriverBuilder {
        AnalysisDriverBuilder {
            config,
            analyzers: Vec::new(),
            filters: Vec::new(),
            transforms: Vec::new(),
            matchers: Vec::new(),
            old_api: Api::new(),
            new_api: Api::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Acquires archive analyzer resources for both sides.
    ///
    /// Opening an already open driver is a no-op. A failure to acquire any
    /// analyzer releases the ones acquired so far and fails the run.
    pub fn open(&mut self) -> Result<(), Error> {
        if self.sides.is_some() {
            return Ok(());
        }

        let mut sides: Vec<AnalyzerSides> = Vec::with_capacity(self.analyzers.len());
        let outcome = (|| -> Result<(), Error> {
            for factory in &self.analyzers {
                let context = extension_context(
                    Some(factory.id()),
                    &self.config,
                    &self.criticalities,
                    &self.matchers,
                );

                let mut old =
                    factory
                        .create(&self.old_api, &context)
                        .map_err(|source| Error::ArtifactUnresolved {
                            api: "old".to_string(),
                            source,
                        })?;
                old.initialize(&context)
                    .map_err(|source| Error::ExtensionInitialization {
                        id: factory.id().to_string(),
                        source,
                    })?;

                let mut new =
                    factory
                        .create(&self.new_api, &context)
                        .map_err(|source| Error::ArtifactUnresolved {
                            api: "new".to_string(),
                            source,
                        })?;
                new.initialize(&context)
                    .map_err(|source| Error::ExtensionInitialization {
                        id: factory.id().to_string(),
                        source,
                    })?;

                let mut checks =
                    factory
                        .checks(&context)
                        .map_err(|source| Error::ExtensionInitialization {
                            id: factory.id().to_string(),
                            source,
                        })?;
                for check in checks.iter_mut() {
                    let check_context = extension_context(
                        check.extension_id(),
                        &self.config,
                        &self.criticalities,
                        &self.matchers,
                    );
                    let id = check.extension_id().unwrap_or("<anonymous>").to_string();
                    check
                        .initialize(&check_context)
                        .map_err(|source| Error::ExtensionInitialization { id, source })?;
                }

                sides.push(AnalyzerSides {
                    id: factory.id().to_string(),
                    old,
                    new,
                    checks,
                });
            }
            Ok(())
        })();

        match outcome {
            Ok(()) => {
                info!(
                    "analysis driver opened with {count} analyzer(s)",
                    count = sides.len()
                );
                self.sides = Some(sides);
                Ok(())
            }
            Err(error) => {
                for side in sides.iter_mut() {
                    side.old.release();
                    side.new.release();
                }
                Err(error)
            }
        }
    }

    /// Runs the analysis, routing the final reports to the given reporters.
    ///
    /// Opens the driver if it is not open yet. Reports arrive at reporters
    /// serially, in walk order; a failing reporter is logged and does not
    /// affect the others or the walk.
    pub fn run(
        &mut self,
        reporters: &mut [&mut dyn Reporter],
    ) -> Result<AnalysisResult, Error> {
        self.open()?;

        let mut admitted = Vec::new();
        for (index, reporter) in reporters.iter_mut().enumerate() {
            if !self.config.reporters().admits(reporter.extension_id()) {
                continue;
            }
            let context = extension_context(
                reporter.extension_id(),
                &self.config,
                &self.criticalities,
                &self.matchers,
            );
            let id = reporter.extension_id().unwrap_or("<anonymous>").to_string();
            reporter
                .initialize(&context)
                .map_err(|source| Error::ExtensionInitialization { id, source })?;
            admitted.push(index);
        }

        let completion_retries = self.config.completion_retries();
        let prune = self.config.prune();
        let mut result = AnalysisResult::default();

        let Self {
            criticalities,
            mapping,
            filters,
            pipeline,
            sides,
            cancellation,
            ..
        } = &mut *self;
        let sides = sides.as_mut().expect("the driver should be open");

        for side in sides.iter_mut() {
            debug!(analyzer = side.id.as_str(), "analyzing the old API");
            let mut analyze_filter = compose_filter(filters, &side.id);
            let mut old_forest = side
                .old
                .analyze(analyze_filter.as_mut())
                .map_err(|source| Error::ArtifactUnresolved {
                    api: "old".to_string(),
                    source,
                })?;

            debug!(analyzer = side.id.as_str(), "analyzing the new API");
            let mut analyze_filter = compose_filter(filters, &side.id);
            let mut new_forest = side
                .new
                .analyze(analyze_filter.as_mut())
                .map_err(|source| Error::ArtifactUnresolved {
                    api: "new".to_string(),
                    source,
                })?;

            if prune {
                side.old.prune(&mut old_forest);
                side.new.prune(&mut new_forest);
            }
            old_forest.set_analyzer(side.id.clone());
            new_forest.set_analyzer(side.id.clone());

            let dispatcher = CheckDispatcher::new(std::mem::take(&mut side.checks));
            pipeline.start_traversal(&side.id);

            let mut visitor = KernelVisitor {
                old_filter: compose_filter(filters, &side.id),
                new_filter: compose_filter(filters, &side.id),
                dispatcher,
                pipeline: &mut *pipeline,
                mapping: &*mapping,
                criticalities: &*criticalities,
                old_analyzer: side.old.as_ref(),
                new_analyzer: side.new.as_ref(),
                completion_retries,
                frames: Vec::new(),
                pending: Vec::new(),
                fatal: Vec::new(),
                pairs_visited: 0,
            };

            let walker = ForestWalker::new(&old_forest, &new_forest)
                .with_cancellation(cancellation.clone());
            let outcome = walker.walk(&mut visitor);

            let KernelVisitor {
                old_filter: mut walk_old_filter,
                new_filter: mut walk_new_filter,
                dispatcher,
                pending,
                fatal,
                pairs_visited,
                ..
            } = visitor;
            side.checks = dispatcher.into_checks();
            pipeline.end_traversal();
            outcome?;

            let old_resolutions = walk_old_filter.finish();
            let new_resolutions = walk_new_filter.finish();

            result.fatal_errors.extend(fatal);
            result.pairs_visited += pairs_visited;

            for report in pending {
                let old_matched = resolve_side(report.old_matched, report.old, &old_resolutions);
                let new_matched = resolve_side(report.new_matched, report.new, &new_resolutions);
                if old_matched.and(new_matched) != Ternary::Yes {
                    continue;
                }

                let report = Report {
                    old: report.old.map(|id| old_forest.element(id)),
                    new: report.new.map(|id| new_forest.element(id)),
                    differences: report.differences,
                };
                result.observe(&report.differences);

                for index in &admitted {
                    if let Err(e) = reporters[*index].report(&report) {
                        warn!(
                            reporter = reporters[*index]
                                .extension_id()
                                .unwrap_or("<anonymous>"),
                            "reporter failed; continuing: {e:#}"
                        );
                    }
                }
                result.reports_emitted += 1;
            }
        }

        for index in &admitted {
            reporters[*index].close();
        }

        info!(
            pairs = result.pairs_visited,
            reports = result.reports_emitted,
            "analysis run finished"
        );
        Ok(result)
    }

    /// Releases all acquired resources.
    ///
    /// Idempotent and safe to call after failures; also performed on drop.
    pub fn close(&mut self) {
        if let Some(mut sides) = self.sides.take() {
            for side in sides.iter_mut() {
                side.old.release();
                side.old.close();
                side.new.release();
                side.new.close();
                for check in side.checks.iter_mut() {
                    check.close();
                }
            }
        }

        for filter in self.filters.iter_mut() {
            filter.close();
        }
        for transform in self.pipeline.transforms_mut() {
            transform.close();
        }
    }
}

impl Drop for AnalysisDriver {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AnalysisDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisDriver")
            .field("analyzers", &self.analyzers.len())
            .field("filters", &self.filters.len())
            .field("matchers", &self.matchers.keys().collect::<Vec<_>>())
            .field("open", &self.sides.is_some())
            .finish()
    }
}

impl std::fmt::Debug for AnalysisDriverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisDriverBuilder")
            .field("analyzers", &self.analyzers.len())
            .field("filters", &self.filters.len())
            .field("transforms", &self.transforms.len())
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

/// Builds the analysis context for an extension.
fn extension_context(
    id: Option<&str>,
    config: &PipelineConfig,
    criticalities: &CriticalitySet,
    matchers: &IndexMap<String, Arc<dyn ElementMatcher>>,
) -> AnalysisContext {
    let configuration = id
        .map(|id| config.extensions().configuration_for(id))
        .unwrap_or(Value::Null);
    AnalysisContext::new(configuration, criticalities.clone(), matchers.clone())
}

/// Composes the filters of every provider into a single intersection.
fn compose_filter(
    providers: &[Box<dyn FilterProvider>],
    analyzer_id: &str,
) -> Box<dyn TreeFilter> {
    let filters: Vec<Box<dyn TreeFilter>> = providers
        .iter()
        .filter_map(|provider| provider.filter_for(analyzer_id))
        .collect();
    if filters.is_empty() {
        Box::new(MatchAll)
    } else {
        Box::new(intersection(filters))
    }
}

/// Resolves the final match state of one side of a pending report.
fn resolve_side(
    matched: Ternary,
    element: Option<ElementId>,
    resolutions: &IndexMap<ElementId, Ternary>,
) -> Ternary {
    if matched.is_decided() {
        return matched;
    }

    let Some(id) = element else {
        // A missing side is neutral for the pair's admission
        return Ternary::Yes;
    };

    match resolutions.get(&id).copied() {
        // An element the filter never resolves is excluded
        Some(Ternary::Yes) => Ternary::Yes,
        _ => Ternary::No,
    }
}

/// Completes an element with bounded retries.
fn complete_with_retries(
    analyzer: &dyn ApiAnalyzer,
    element: Element<'_>,
    retries: u32,
) -> Result<(), Error> {
    let mut attempts = 0u32;
    loop {
        match analyzer.complete(element) {
            Ok(()) => return Ok(()),
            Err(source) => {
                attempts += 1;
                if attempts >= retries.max(1) {
                    return Err(Error::AnalysisIncomplete {
                        element: element.display_name().to_string(),
                        attempts,
                        source,
                    });
                }
                warn!(
                    "analysis of element `{element}` did not complete (attempt {attempts}); \
                     retrying"
                );
            }
        }
    }
}

/// The per-pair state the kernel visitor tracks between enter and leave.
#[derive(Debug)]
struct VisitFrame {
    /// The match state of the old side.
    old_matched: Ternary,
    /// The match state of the new side.
    new_matched: Ternary,
    /// Whether the old filter's start was called.
    old_started: bool,
    /// Whether the new filter's start was called.
    new_started: bool,
    /// Whether the dispatcher entered the pair.
    checked: bool,
    /// Whether transform traversal events were fired for the pair.
    events: bool,
    /// Whether the pair was skipped after a completion failure.
    skipped: bool,
}

impl VisitFrame {
    /// Creates a frame for a pair skipped after a completion failure.
    fn skipped() -> Self {
        Self {
            old_matched: Ternary::No,
            new_matched: Ternary::No,
            old_started: false,
            new_started: false,
            checked: false,
            events: false,
            skipped: true,
        }
    }
}

/// A report buffered until the tree filters are finally resolved.
///
/// Reports of decisively matched pairs could be emitted during the walk,
/// but a pair whose admission is still undecided must wait for the terminal
/// filter resolution; buffering everything keeps emission in walk order
/// either way.
#[derive(Debug)]
struct PendingReport {
    /// The identifier of the old element.
    old: Option<ElementId>,
    /// The identifier of the new element.
    new: Option<ElementId>,
    /// The match state of the old side at leave time.
    old_matched: Ternary,
    /// The match state of the new side at leave time.
    new_matched: Ternary,
    /// The final differences of the pair.
    differences: Vec<Difference>,
}

/// The visitor wiring filters, checks, and transforms into the walk.
struct KernelVisitor<'r> {
    /// The composed tree filter over old elements.
    old_filter: Box<dyn TreeFilter>,
    /// The composed tree filter over new elements.
    new_filter: Box<dyn TreeFilter>,
    /// The check dispatcher of the current analyzer.
    dispatcher: CheckDispatcher,
    /// The transform pipeline.
    pipeline: &'r mut TransformPipeline,
    /// The severity-to-criticality mapping.
    mapping: &'r SeverityMapping,
    /// The criticalities recognized within the run.
    criticalities: &'r CriticalitySet,
    /// The analyzer of the old side, for lazy element completion.
    old_analyzer: &'r dyn ApiAnalyzer,
    /// The analyzer of the new side, for lazy element completion.
    new_analyzer: &'r dyn ApiAnalyzer,
    /// The retry count for transient completion failures.
    completion_retries: u32,
    /// The per-pair frames, parallel to the walk stack.
    frames: Vec<VisitFrame>,
    /// The buffered reports, in walk order.
    pending: Vec<PendingReport>,
    /// The fatal per-element errors recorded so far.
    fatal: Vec<Error>,
    /// The number of pairs visited.
    pairs_visited: usize,
}

impl KernelVisitor<'_> {
    /// Assigns the default criticality to differences that lack one.
    fn assign_criticalities(&self, differences: &mut [Difference]) {
        for difference in differences {
            if difference.criticality().is_some() {
                continue;
            }

            let name = self
                .mapping
                .get(difference.max_severity())
                .expect("the severity mapping should be total");
            let criticality = self
                .criticalities
                .get(name)
                .expect("a mapped criticality should be configured");
            *difference = difference.clone().with_criticality(criticality.clone());
        }
    }
}

impl PairVisitor for KernelVisitor<'_> {
    fn enter(&mut self, pair: &ElementPair<'_>) -> Result<bool, Error> {
        // Lazy completion with bounded retries; a persistent failure
        // abandons the subtree but not the walk
        for (element, analyzer) in [
            (pair.old, self.old_analyzer),
            (pair.new, self.new_analyzer),
        ] {
            let Some(element) = element else { continue };
            if let Err(error) =
                complete_with_retries(analyzer, element, self.completion_retries)
            {
                warn!("abandoning the subtree of `{element}`: {error}");
                self.fatal.push(error);
                self.frames.push(VisitFrame::skipped());
                return Ok(false);
            }
        }

        let (old_matched, old_descend, old_started) = match pair.old {
            Some(element) => {
                let result = self.old_filter.start(element);
                (result.matched, result.descend, true)
            }
            None => (Ternary::Yes, Ternary::No, false),
        };
        let (new_matched, new_descend, new_started) = match pair.new {
            Some(element) => {
                let result = self.new_filter.start(element);
                (result.matched, result.descend, true)
            }
            None => (Ternary::Yes, Ternary::No, false),
        };

        let matched = old_matched.and(new_matched);
        let descend = old_descend.or(new_descend);
        self.pairs_visited += 1;

        if matched == Ternary::No && descend == Ternary::No {
            self.frames.push(VisitFrame {
                old_matched,
                new_matched,
                old_started,
                new_started,
                checked: false,
                events: false,
                skipped: false,
            });
            return Ok(false);
        }

        self.pipeline.start_elements(pair);

        let checked = matched != Ternary::No;
        if checked {
            self.dispatcher.enter_pair(pair);
        }

        // An undecided descend errs on the side of looking
        let mut descend = descend != Ternary::No;
        if pair.is_half() && !self.dispatcher.has_descending_checks() {
            descend = false;
        }

        self.frames.push(VisitFrame {
            old_matched,
            new_matched,
            old_started,
            new_started,
            checked,
            events: true,
            skipped: false,
        });
        Ok(descend)
    }

    fn leave(&mut self, pair: &ElementPair<'_>) -> Result<(), Error> {
        let mut frame = self.frames.pop().expect("unbalanced visitor leave");
        if frame.skipped {
            return Ok(());
        }

        let mut differences = if frame.checked {
            self.dispatcher.leave_pair(pair)
        } else {
            Vec::new()
        };

        // Give the filters their paired finish; a decided result refines an
        // undecided start
        if frame.old_started {
            if let Some(element) = pair.old {
                let refined = self.old_filter.finish_element(element);
                if refined.is_decided() {
                    frame.old_matched = refined;
                }
            }
        }
        if frame.new_started {
            if let Some(element) = pair.new {
                let refined = self.new_filter.finish_element(element);
                if refined.is_decided() {
                    frame.new_matched = refined;
                }
            }
        }

        if frame.events {
            // Annotation differences were attached to the containing pair by
            // the dispatcher; the annotation itself gets no report
            let attached_annotation = pair.kind() == ElementKind::Annotation
                && pair.either().parent().is_some();
            if frame.checked && !attached_annotation {
                if !differences.is_empty() {
                    differences = self.pipeline.process(pair, differences)?;
                }
                self.assign_criticalities(&mut differences);
                self.pending.push(PendingReport {
                    old: pair.old.map(|element| element.id()),
                    new: pair.new.map(|element| element.id()),
                    old_matched: frame.old_matched,
                    new_matched: frame.new_matched,
                    differences,
                });
            }
            self.pipeline.end_elements(pair);
        }

        Ok(())
    }
}
