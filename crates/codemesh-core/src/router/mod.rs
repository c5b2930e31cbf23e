//! Tiered extraction routing.
//!
//! For each source file the router applies Tier-1 deterministic pattern
//! matching from every schema whose detection predicate hits, consults the
//! trust ledger to decide which matches deserve expensive verification,
//! escalates to Tier-2 disambiguation and Tier-3 discovery when warranted,
//! and folds outcomes back into the ledger and the evolution queue.
//!
//! Within one file the tiers run strictly in order; across files the router
//! is freely parallel (see the extraction engine).

mod escalation;
mod prompts;

pub use escalation::{
    Disambiguation, DisambiguationRequest, DisambiguationStatus, DiscoveredEdge, DiscoveredNode,
    Discovery, DiscoveryRequest, Escalation, EscalationError, LlmEscalation, PatternSuggestion,
};

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::evolution::{EvolutionQueue, SchemaSuggestion, SuggestionSource};
use crate::mesh::model::{Entity, EntityKind, Provenance, Relation, RelationKind, SourceLocation, Tier};
use crate::schema::{CompiledSchema, SchemaRegistry};
use crate::trust::{Outcome, TrustLedger};

/// Everything the router produced for one file.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileExtractionResult {
    pub file_path: String,
    pub nodes: Vec<Entity>,
    pub edges: Vec<Relation>,
    /// Minimum confidence across all produced provenance. Worst case
    /// governs: one low-confidence construct is not masked by many
    /// high-confidence ones.
    pub confidence: f64,
    /// Highest tier the file escalated to.
    pub tier: Tier,
    pub schemas_used: Vec<String>,
    /// Ambiguities that could not be resolved — a coverage signal, not an
    /// error.
    pub unresolved_patterns: Vec<String>,
    /// File-level data errors; never stop processing of other files.
    pub errors: Vec<String>,
}

/// Tunable routing thresholds.
#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    /// Tier-1 matches below this confidence are ambiguous and always
    /// eligible for escalation.
    pub tier1_confidence_threshold: f64,
    /// Tier-2 results below this confidence escalate further to Tier-3.
    pub tier2_confidence_threshold: f64,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            tier1_confidence_threshold: crate::config::DEFAULT_TIER1_CONFIDENCE_THRESHOLD,
            tier2_confidence_threshold: crate::config::DEFAULT_TIER2_CONFIDENCE_THRESHOLD,
        }
    }
}

/// A Tier-1 candidate: an entity plus the pattern that produced it.
struct Candidate {
    entity: Entity,
    schema: String,
    pattern: String,
    language: String,
}

/// The extraction router.
///
/// Shared across concurrently processed files; all interior state lives in
/// the registry, ledger, and queue, each of which synchronizes itself.
pub struct ExtractionRouter {
    registry: Arc<SchemaRegistry>,
    ledger: Arc<TrustLedger>,
    evolution: Arc<EvolutionQueue>,
    escalation: Option<Arc<dyn Escalation>>,
    options: RouterOptions,
}

impl ExtractionRouter {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        ledger: Arc<TrustLedger>,
        evolution: Arc<EvolutionQueue>,
        escalation: Option<Arc<dyn Escalation>>,
        options: RouterOptions,
    ) -> Self {
        Self {
            registry,
            ledger,
            evolution,
            escalation,
            options,
        }
    }

    /// Extract one file. Never fails at the function level: every problem
    /// lands in the result's `errors` or `unresolved_patterns`, and a file
    /// matching nothing still yields a placeholder file entity, so coverage
    /// accounting stays exact.
    pub async fn extract_file(
        &self,
        project_id: &str,
        file_path: &str,
        content: &str,
    ) -> FileExtractionResult {
        let mut unresolved = Vec::new();
        let mut errors = Vec::new();
        let mut max_tier = Tier::Deterministic;

        let schemas = self.registry.matching_schemas(file_path, content);

        // No schema and no escalation: record the file with zero confidence
        // rather than silently skipping it.
        if schemas.is_empty() && self.escalation.is_none() {
            return FileExtractionResult {
                file_path: file_path.to_string(),
                nodes: vec![file_entity(project_id, file_path, content, &schemas)],
                edges: Vec::new(),
                confidence: 0.0,
                tier: Tier::Deterministic,
                schemas_used: Vec::new(),
                unresolved_patterns: vec![format!("no schema matched {file_path}")],
                errors: Vec::new(),
            };
        }

        // ---- Tier 1: deterministic pattern matching ------------------------
        let mut candidates = Vec::new();
        for schema in &schemas {
            candidates.extend(self.apply_node_rules(schema, project_id, file_path, content, &mut errors));
        }

        // ---- Tier 2: sampled disambiguation --------------------------------
        // "Unknown pattern": detection matched but nothing extracted also
        // counts as having no Tier-1 match.
        let mut needs_discovery = schemas.is_empty() || candidates.is_empty();
        if let Some(escalation) = &self.escalation {
            let mut kept = Vec::with_capacity(candidates.len());
            for mut candidate in candidates {
                if !self.should_escalate(&candidate) {
                    kept.push(candidate);
                    continue;
                }

                max_tier = max_tier.max(Tier::Assisted);
                let request = DisambiguationRequest {
                    file_path: file_path.to_string(),
                    kind: format!("{:?}", candidate.entity.kind).to_lowercase(),
                    name: candidate.entity.name.clone(),
                    context: span_context(content, &candidate.entity.location),
                };

                match escalation.disambiguate(request).await {
                    Ok(result) => {
                        if result.confidence < self.options.tier2_confidence_threshold {
                            needs_discovery = true;
                        }
                        match result.status {
                            DisambiguationStatus::Verified => {
                                self.ledger.record(
                                    &candidate.schema,
                                    &candidate.pattern,
                                    &candidate.language,
                                    Outcome::Verified,
                                );
                                kept.push(candidate);
                            }
                            DisambiguationStatus::Corrected => {
                                self.ledger.record(
                                    &candidate.schema,
                                    &candidate.pattern,
                                    &candidate.language,
                                    Outcome::Corrected,
                                );
                                self.evolution.push(SchemaSuggestion {
                                    language: candidate.language.clone(),
                                    pattern: candidate.pattern.clone(),
                                    schema: Some(candidate.schema.clone()),
                                    suggested_regex: None,
                                    source: SuggestionSource::Tier2Correction,
                                    detail: result.reasoning.clone(),
                                });
                                apply_correction(&mut candidate, &result);
                                kept.push(candidate);
                            }
                            DisambiguationStatus::Rejected => {
                                self.ledger.record(
                                    &candidate.schema,
                                    &candidate.pattern,
                                    &candidate.language,
                                    Outcome::Rejected,
                                );
                                debug!(
                                    file = file_path,
                                    pattern = %candidate.pattern,
                                    name = %candidate.entity.name,
                                    "candidate rejected by disambiguation"
                                );
                            }
                        }
                    }
                    // Escalation failure: unresolved, keep the Tier-1
                    // result, leave the trust record untouched.
                    Err(e) => {
                        unresolved.push(format!(
                            "{}/{}: disambiguation failed: {e}",
                            candidate.schema, candidate.pattern
                        ));
                        kept.push(candidate);
                    }
                }
            }
            candidates = kept;
        }

        // File entity anchors the Contains edges.
        let file_node = file_entity(project_id, file_path, content, &schemas);
        let file_id = file_node.id.clone();

        let mut nodes = vec![file_node];
        let mut edges = Vec::new();
        let mut by_name: HashMap<String, String> = HashMap::new();

        for candidate in candidates {
            by_name
                .entry(candidate.entity.name.clone())
                .or_insert_with(|| candidate.entity.id.clone());
            edges.push(Relation::new(
                RelationKind::Contains,
                file_id.clone(),
                candidate.entity.id.clone(),
                candidate.entity.provenance.clone(),
            ));
            nodes.push(candidate.entity);
        }

        // Edge rules run against the resolved entity names of this file.
        for schema in &schemas {
            self.apply_edge_rules(
                schema,
                content,
                &by_name,
                &file_id,
                &mut edges,
                &mut unresolved,
            );
        }

        // ---- Tier 3: full discovery ----------------------------------------
        if needs_discovery {
            if let Some(escalation) = &self.escalation {
                max_tier = Tier::Discovery;
                let request = DiscoveryRequest {
                    file_path: file_path.to_string(),
                    language_hint: extension_of(file_path),
                    content: content.to_string(),
                };
                match escalation.discover(request).await {
                    Ok(discovery) => {
                        self.merge_discovery(
                            project_id,
                            file_path,
                            discovery,
                            &file_id,
                            &mut nodes,
                            &mut edges,
                            &mut by_name,
                            &mut unresolved,
                            &mut errors,
                        );
                    }
                    Err(e) => {
                        unresolved.push(format!("discovery failed for {file_path}: {e}"));
                    }
                }
            } else {
                unresolved.push(format!("no pattern matched {file_path}"));
            }
        }

        let confidence = nodes
            .iter()
            .map(|n| n.provenance.confidence)
            .chain(edges.iter().map(|e| e.provenance.confidence))
            .fold(f64::INFINITY, f64::min);
        let confidence = if confidence.is_finite() { confidence } else { 0.0 };

        let mut schemas_used: Vec<String> =
            schemas.iter().map(|s| s.document.name.clone()).collect();
        schemas_used.sort();

        FileExtractionResult {
            file_path: file_path.to_string(),
            nodes,
            edges,
            confidence,
            tier: max_tier,
            schemas_used,
            unresolved_patterns: unresolved,
            errors,
        }
    }

    /// Whether one Tier-1 candidate warrants verification.
    ///
    /// Ambiguous matches (below the Tier-1 floor) always escalate; the rest
    /// go through the ledger's sampling draw.
    fn should_escalate(&self, candidate: &Candidate) -> bool {
        if candidate.entity.provenance.confidence < self.options.tier1_confidence_threshold {
            return true;
        }
        self.ledger.should_verify(&candidate.schema, &candidate.pattern)
    }

    /// Apply one schema's node rules to the content.
    fn apply_node_rules(
        &self,
        schema: &CompiledSchema,
        project_id: &str,
        file_path: &str,
        content: &str,
        errors: &mut Vec<String>,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for rule in &schema.node_rules {
            for captures in rule.regex.captures_iter(content) {
                let Some(name) = captures.get(rule.rule.name_group).map(|m| m.as_str()) else {
                    continue;
                };

                let matched = captures.get(0).map(|m| (m.start(), m.as_str())).unwrap_or((0, ""));
                let start_line = line_of_offset(content, matched.0);
                let end_line = start_line + matched.1.matches('\n').count() as u32;

                let location = SourceLocation::new(file_path, start_line, end_line);
                let provenance =
                    Provenance::deterministic(&schema.document.name, rule.rule.confidence_boost);

                match Entity::new(rule.kind, name, location, project_id, provenance) {
                    Ok(mut entity) => {
                        for (property, group) in &rule.rule.property_groups {
                            if let Some(value) = captures.get(*group) {
                                entity = entity.with_property(
                                    property.clone(),
                                    serde_json::json!(value.as_str()),
                                );
                            }
                        }
                        candidates.push(Candidate {
                            entity,
                            schema: schema.document.name.clone(),
                            pattern: rule.rule.name.clone(),
                            language: schema.document.language.clone(),
                        });
                    }
                    // Data error: log and skip the record, keep the file.
                    Err(e) => errors.push(format!("{}/{}: {e}", schema.document.name, rule.rule.name)),
                }
            }
        }

        candidates
    }

    /// Apply one schema's edge rules against resolved entity names.
    fn apply_edge_rules(
        &self,
        schema: &CompiledSchema,
        content: &str,
        by_name: &HashMap<String, String>,
        file_id: &str,
        edges: &mut Vec<Relation>,
        unresolved: &mut Vec<String>,
    ) {
        for rule in &schema.edge_rules {
            for captures in rule.regex.captures_iter(content) {
                let Some(from_name) = captures.get(rule.rule.from_group).map(|m| m.as_str())
                else {
                    continue;
                };

                let Some(from_id) = by_name.get(from_name) else {
                    unresolved.push(format!(
                        "{}/{}: edge endpoint '{from_name}' not extracted",
                        schema.document.name, rule.rule.name
                    ));
                    continue;
                };

                let to_id = if rule.rule.to_group == 0 {
                    file_id.to_string()
                } else {
                    let Some(to_name) = captures.get(rule.rule.to_group).map(|m| m.as_str())
                    else {
                        continue;
                    };
                    match by_name.get(to_name) {
                        Some(id) => id.clone(),
                        None => {
                            unresolved.push(format!(
                                "{}/{}: edge endpoint '{to_name}' not extracted",
                                schema.document.name, rule.rule.name
                            ));
                            continue;
                        }
                    }
                };

                edges.push(Relation::new(
                    rule.kind,
                    from_id.clone(),
                    to_id,
                    Provenance::deterministic(&schema.document.name, rule.rule.confidence_boost),
                ));
            }
        }
    }

    /// Fold a Tier-3 discovery into the file's result.
    #[allow(clippy::too_many_arguments)]
    fn merge_discovery(
        &self,
        project_id: &str,
        file_path: &str,
        discovery: Discovery,
        file_id: &str,
        nodes: &mut Vec<Entity>,
        edges: &mut Vec<Relation>,
        by_name: &mut HashMap<String, String>,
        unresolved: &mut Vec<String>,
        errors: &mut Vec<String>,
    ) {
        // A placeholder file entity predates discovery; once discovery
        // succeeds the file is no longer "unmatched".
        if let Some(file_node) = nodes.first_mut() {
            if file_node.provenance.schema.is_none() && file_node.provenance.confidence == 0.0 {
                file_node.provenance = Provenance::discovery(discovery.confidence);
            }
        }

        for suggestion in &discovery.suggestions {
            self.evolution.push(SchemaSuggestion {
                language: discovery
                    .framework
                    .clone()
                    .unwrap_or_else(|| extension_of(file_path)),
                pattern: suggestion.pattern.clone(),
                schema: None,
                suggested_regex: suggestion.regex.clone(),
                source: SuggestionSource::Tier3Discovery,
                detail: suggestion.detail.clone(),
            });
        }

        for node in discovery.nodes {
            let Some(kind) = EntityKind::parse(&node.kind) else {
                errors.push(format!("discovery proposed unknown kind '{}'", node.kind));
                continue;
            };
            // The placeholder/file node is already present.
            if kind == EntityKind::File {
                continue;
            }

            let location = SourceLocation::new(file_path, node.start_line, node.end_line);
            match Entity::new(
                kind,
                &node.name,
                location,
                project_id,
                Provenance::discovery(discovery.confidence),
            ) {
                Ok(entity) => {
                    by_name
                        .entry(entity.name.clone())
                        .or_insert_with(|| entity.id.clone());
                    edges.push(Relation::new(
                        RelationKind::Contains,
                        file_id.to_string(),
                        entity.id.clone(),
                        entity.provenance.clone(),
                    ));
                    nodes.push(entity);
                }
                Err(e) => errors.push(format!("discovery: {e}")),
            }
        }

        for edge in discovery.edges {
            let Some(kind) = RelationKind::parse(&edge.kind) else {
                errors.push(format!("discovery proposed unknown edge kind '{}'", edge.kind));
                continue;
            };
            let (Some(from_id), Some(to_id)) = (by_name.get(&edge.from), by_name.get(&edge.to))
            else {
                unresolved.push(format!(
                    "discovery edge {} -> {} references unknown entities",
                    edge.from, edge.to
                ));
                continue;
            };
            edges.push(Relation::new(
                kind,
                from_id.clone(),
                to_id.clone(),
                Provenance::discovery(discovery.confidence),
            ));
        }

        if discovery.framework.is_some() {
            warn!(
                file = file_path,
                framework = discovery.framework.as_deref().unwrap_or(""),
                "discovery detected an uncovered framework"
            );
        }
    }
}

/// The file entity every extraction anchors to.
///
/// Carries a content hash so cross-revision queries can tell identical
/// from changed file states without re-reading the tree.
fn file_entity(
    project_id: &str,
    file_path: &str,
    content: &str,
    schemas: &[Arc<CompiledSchema>],
) -> Entity {
    let entity = if schemas.is_empty() {
        Entity::unmatched_file(file_path, project_id)
    } else {
        let line_count = content.lines().count().max(1) as u32;
        let provenance = Provenance::deterministic(&schemas[0].document.name, 1.0);
        Entity::new(
            EntityKind::File,
            file_path,
            SourceLocation::new(file_path, 1, line_count),
            project_id,
            provenance,
        )
        .expect("file path is never empty")
    };

    entity
        .with_property("hash", serde_json::json!(content_hash(content)))
        .with_property("size", serde_json::json!(content.len()))
}

/// SHA256 of file contents, hex encoded.
fn content_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Replace a corrected candidate's identity with the Tier-2 result.
fn apply_correction(candidate: &mut Candidate, result: &Disambiguation) {
    if let Some(kind) = EntityKind::parse(&result.kind) {
        candidate.entity.kind = kind;
    }
    if !result.name.trim().is_empty() {
        candidate.entity.name = result.name.clone();
    }
    candidate.entity.provenance =
        Provenance::assisted(Some(candidate.schema.clone()), result.confidence);
}

/// 1-based line number of a byte offset.
fn line_of_offset(content: &str, offset: usize) -> u32 {
    content[..offset.min(content.len())].matches('\n').count() as u32 + 1
}

/// Source lines around a span, for disambiguation context.
fn span_context(content: &str, location: &SourceLocation) -> String {
    const SURROUNDING: u32 = 3;
    let start = location.start_line.saturating_sub(SURROUNDING + 1) as usize;
    let end = (location.end_line + SURROUNDING) as usize;
    content
        .lines()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect::<Vec<_>>()
        .join("\n")
}

/// File extension, lowercased, as a language hint.
fn extension_of(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("unknown")
        .to_lowercase()
}
