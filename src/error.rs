use thiserror::Error;

macro_rules! contradiction {
    // Single string version
    ($msg:expr) => {
        crate::Error::Contradictory {
            message: format!($msg),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Contradictory {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers the failure modes of constraint parsing, tree synthesis and
/// flow-graph generation. Each variant provides specific context about the failure
/// mode to enable appropriate error handling.
///
/// # Error Categories
///
/// ## Domain Errors (caller-recoverable)
/// - [`Error::Contradictory`] - The constraint set cannot be realized as one tree
/// - [`Error::Parse`] - Malformed constraint expression text
///
/// ## Lookup Errors
/// - [`Error::NotFound`] - A requested node/label does not exist in the tree
/// - [`Error::NoCommonAncestor`] - The queried nodes share no ancestor
///
/// ## Graph Errors
/// - [`Error::GraphError`] - Dependency graph or flow graph construction error
///
/// Internal invariant violations (arena corruption, a relaxation pass finding no
/// candidate for a constraint that was satisfiable by construction) are *not*
/// represented here: they are bugs in the engine, never bad input, and panic.
///
/// # Examples
///
/// ```rust
/// use flowforge::{Constraint, Error, Relation, Synthesizer};
///
/// let constraints = vec![
///     Constraint::new(Relation::Before, "A", "B"),
///     Constraint::new(Relation::Before, "B", "A"),
/// ];
/// match Synthesizer::default().synthesize(constraints, Vec::new()) {
///     Ok(tree) => println!("Synthesized {} nodes", tree.node_count()),
///     Err(Error::Contradictory { message, .. }) => {
///         eprintln!("Contradictory constraints: {}", message);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The constraint set cannot be accommodated by any single tree shape.
    ///
    /// This error is raised when a constraint cannot be placed without violating
    /// another constraint and no relaxation candidate succeeds, or when a loop's
    /// members cannot be geometrically isolated from non-members. The message
    /// names the offending constraint and carries the structural encoding of the
    /// tree at failure time for diagnostics. The committed tree is left exactly
    /// as it was before the failing step.
    ///
    /// # Fields
    ///
    /// * `message` - Offending constraint plus the tree shape at failure time
    /// * `file` - Source file in which the contradiction was detected
    /// * `line` - Source line in which the contradiction was detected
    #[error("Contradictory - {file}:{line}: {message}")]
    Contradictory {
        /// The message to be printed for the Contradictory error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A constraint expression line could not be tokenized or parsed.
    ///
    /// Carries the position of the offending character or token within the
    /// input, 1-based.
    #[error("Parse error at {line}:{column}: {message}")]
    Parse {
        /// Description of what was malformed
        message: String,
        /// 1-based input line of the offending token
        line: usize,
        /// 1-based column of the offending token
        column: usize,
    },

    /// A node or task label was not found in the tree.
    ///
    /// The associated value names the missing label or node id.
    #[error("Not found in tree - {0}")]
    NotFound(String),

    /// The queried nodes share no common ancestor.
    ///
    /// Signals an unmergeable constraint set upstream: the endpoints live in
    /// subtrees that were never joined.
    #[error("The queried nodes share no common ancestor")]
    NoCommonAncestor,

    /// Dependency graph or flow graph error.
    ///
    /// Errors related to task dependency graph construction and flow graph
    /// lowering, such as edges referencing nodes that do not exist.
    #[error("{0}")]
    GraphError(String),
}
