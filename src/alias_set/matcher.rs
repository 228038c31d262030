use crate::program::Program;

/// Finds the pairs of entities a call site connects across a function
/// boundary. Every entity returned must be a registered pointer value.
pub trait CallMatcher<P: Program> {
    /// Pairs of (actual argument at `call`, formal parameter of `callee`).
    fn match_call_site(
        &self,
        program: &P,
        call: P::CallSite,
        callee: P::Function,
    ) -> Vec<(P::Entity, P::Entity)>;

    /// Pairs of (`call_result`, returned value of the callee).
    fn match_return(
        &self,
        program: &P,
        call_result: P::Entity,
        returned: &[P::Entity],
    ) -> Vec<(P::Entity, P::Entity)>;
}

/// Context-insensitive matching: every pointer actual is merged with the
/// formal in the same position, and a pointer call result with every
/// pointer the callee returns. Extra actuals of a variadic call and missing
/// actuals are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConservativeMatcher;

impl<P: Program> CallMatcher<P> for ConservativeMatcher {
    fn match_call_site(
        &self,
        program: &P,
        call: P::CallSite,
        callee: P::Function,
    ) -> Vec<(P::Entity, P::Entity)> {
        program
            .call_args(call)
            .into_iter()
            .zip(program.params(callee))
            .filter_map(|(actual, formal)| {
                let actual = actual?;
                if program.is_pointer(actual) && program.is_pointer(formal) {
                    Some((actual, formal))
                } else {
                    None
                }
            })
            .collect()
    }

    fn match_return(
        &self,
        program: &P,
        call_result: P::Entity,
        returned: &[P::Entity],
    ) -> Vec<(P::Entity, P::Entity)> {
        if !program.is_pointer(call_result) {
            return vec![];
        }
        returned
            .iter()
            .filter(|r| program.is_pointer(**r))
            .map(|r| (call_result, *r))
            .collect()
    }
}
