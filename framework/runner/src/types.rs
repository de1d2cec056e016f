/// Recommended error type for a scenario binary's `main` function and any shared code that you
/// write for scenario implementations. This type is compatible with [crate::scenario::HookResult]
/// so you can use `?` to propagate errors.
pub type GustResult<T> = anyhow::Result<T>;
