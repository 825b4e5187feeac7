//! Per-element inspection shared by the page sweep and the mutation feed.

use pagewatch_common::record::UNKNOWN;
use pagewatch_common::{Document, ErrorRecord, ErrorSource, NodeId, PatternMatcher, Remediation};
use tracing::debug;

/// A matched element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub node: NodeId,
    pub text: String,
    pub rule_index: usize,
    pub module_hint: String,
}

impl Detection {
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord::new(ErrorSource::DomPattern, self.text.clone())
            .with_module(self.module_hint.clone())
            .with_rule(self.rule_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    /// Missing, detached, or inside the overlay
    Skipped,
    /// Inspected, nothing matched
    Clean,
    Matched(Detection),
}

#[derive(Debug, Clone)]
pub struct Inspector {
    matcher: PatternMatcher,
    module_attribute: String,
    remediation: Remediation,
    /// Subtree never inspected (the overlay panel)
    excluded: Option<NodeId>,
}

impl Inspector {
    pub fn new(matcher: PatternMatcher, module_attribute: impl Into<String>) -> Self {
        Self {
            matcher,
            module_attribute: module_attribute.into(),
            remediation: Remediation::Observe,
            excluded: None,
        }
    }

    pub fn with_remediation(mut self, remediation: Remediation) -> Self {
        self.remediation = remediation;
        self
    }

    pub fn excluding(mut self, root: NodeId) -> Self {
        self.excluded = Some(root);
        self
    }

    pub fn remediation(&self) -> Remediation {
        self.remediation
    }

    pub fn is_excluded(&self, doc: &Document, node: NodeId) -> bool {
        self.excluded
            .map(|root| doc.is_inclusive_ancestor(root, node))
            .unwrap_or(false)
    }

    pub fn inspect(&self, doc: &Document, node: NodeId) -> Inspection {
        if self.is_excluded(doc, node) {
            return Inspection::Skipped;
        }
        let Some(text) = doc.rendered_text(node) else {
            return Inspection::Skipped;
        };
        if text.is_empty() {
            return Inspection::Clean;
        }
        match self.matcher.first_match(&text) {
            Some(rule_index) => Inspection::Matched(Detection {
                node,
                module_hint: self.module_hint(doc, node),
                text,
                rule_index,
            }),
            None => Inspection::Clean,
        }
    }

    /// Module annotation on the nearest ancestor, else the element id
    fn module_hint(&self, doc: &Document, node: NodeId) -> String {
        doc.closest_attr(node, &self.module_attribute)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| doc.attr(node, "id").filter(|id| !id.trim().is_empty()))
            .unwrap_or(UNKNOWN)
            .to_string()
    }

    /// Hide matched elements when configured to suppress. Returns the count hidden.
    pub fn remediate(&self, doc: &mut Document, detections: &[Detection]) -> usize {
        if self.remediation != Remediation::Suppress {
            return 0;
        }
        detections
            .iter()
            .filter(|d| match doc.set_hidden(d.node, true) {
                Ok(()) => true,
                Err(e) => {
                    debug!(node = %d.node, "Could not hide element: {}", e);
                    false
                }
            })
            .count()
    }
}
