/// What kind of job slot a goal competes for when it actually spawns a
/// child process or network request. `Administration` goals (trampolines,
/// resolution bookkeeping) never spawn anything and so are never gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobCategory {
    Substitution,
    Build,
    Administration,
}
