/// Knobs for type resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Infer unannotated parameters from the arguments at call sites
    pub call_site_inference: bool,
    /// Widen a local's type with the values later assigned to it
    pub assignment_unions: bool,
    /// Upper bound on call sites inspected per parameter
    pub max_call_sites: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            call_site_inference: true,
            assignment_unions: true,
            max_call_sites: 64,
        }
    }
}

impl ResolveOptions {
    /// Only annotations and initializers, no cross-site widening
    pub fn annotations_only() -> Self {
        Self {
            call_site_inference: false,
            assignment_unions: false,
            ..Self::default()
        }
    }
}
