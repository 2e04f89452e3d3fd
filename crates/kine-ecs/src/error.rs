use crate::entity::Entity;

/// Contract violations detected by the component store.
///
/// The panicking accessors on [`World`](crate::World) treat these as fatal;
/// the `try_*` variants hand them back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("invalid entity {0}")]
    InvalidEntity(Entity),

    #[error("entity {entity} has no component {component}")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error("context {0} does not exist")]
    MissingContext(&'static str),

    #[error("query accesses component {0} more than once")]
    ConflictingAccess(&'static str),
}

/// Emit a diagnostic and abort the current operation.
#[track_caller]
pub(crate) fn fatal(err: EcsError) -> ! {
    tracing::error!("contract violation: {err}");
    panic!("{err}");
}
