/// Rule definition errors, raised at load time only.
///
/// A rule that fails to parse is never admitted to the registry (fail
/// closed). Evaluation-time problems are never errors: a condition
/// that cannot be evaluated is simply `false`.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The YAML document itself is malformed.
    #[error("rules: invalid rule document: {0}")]
    Syntax(#[from] serde_yaml::Error),

    /// A condition expression uses an operator other than `==`, `>=`, `>`.
    #[error("rules: unknown condition operator in expression '{0}'")]
    UnknownOperator(String),

    /// A condition expression is missing its left-hand field path.
    #[error("rules: invalid condition expression '{0}'")]
    InvalidExpression(String),

    /// A condition node is neither `all`/`any`, an expression string,
    /// nor a field map.
    #[error("rules: invalid condition: {0}")]
    InvalidCondition(String),

    /// The `then` block names an action type this engine does not know.
    #[error("rules: unknown action type '{0}'")]
    UnknownAction(String),

    /// An action config does not match its action type's schema.
    #[error("rules: invalid {kind} action config: {source}")]
    InvalidAction {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
