/// Limits on how much code subroutine inlining may produce
///
/// Every `jsr` gets its own copy of the subroutine it calls, so nested subroutines multiply
/// quickly: a method with `n` levels of `try`/`finally` nesting (each called from two sites)
/// ends up with `2^n` copies of the innermost one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlinerSettings {
    /// Maximum number of instantiations (including the main body)
    pub max_instantiations: Option<usize>,

    /// Maximum number of subroutines which may be active at once (eg. `1` allows subroutines,
    /// but not subroutines called from subroutines)
    pub max_nesting_depth: Option<usize>,
}

impl InlinerSettings {
    /// No limits at all
    pub const UNLIMITED: InlinerSettings = InlinerSettings {
        max_instantiations: None,
        max_nesting_depth: None,
    };
}

impl Default for InlinerSettings {
    fn default() -> Self {
        InlinerSettings {
            max_instantiations: Some(65_536),
            max_nesting_depth: None,
        }
    }
}
