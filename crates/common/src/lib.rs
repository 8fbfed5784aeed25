/**
 * Cryptographic types and operations.
 *  - Public and Private key implementations
 *  - Symmetric document secrets
 *  - Hybrid (key-wrapped) content encryption
 */
pub mod crypto;
/**
 * Fire-and-forget notification channel between
 *  a user's clients.
 */
pub mod notify;
/**
 * Concrete multi-step operations (register,
 *  delete) built as instances of the process
 *  framework.
 */
pub mod ops;
/**
 * The process framework: ordered, pausable,
 *  rollback-capable steps and the driver that
 *  runs them.
 */
pub mod process;
/**
 * The shared user profile document - a file
 *  tree plus per-node key rings - and the
 *  optimistic-concurrency manager guarding it.
 */
pub mod profile;
/**
 * The distributed store interface: versioned
 *  content, the CAS-guarded client trait, the
 *  in-memory backend, and the timeout-bounded
 *  encrypting bridge.
 */
pub mod store;
/**
 * In-process multi-client harness for
 *  integration tests.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::crypto::{HybridEncryptedContent, PublicKey, SecretKey};
    pub use crate::process::{
        ExecutionError, Process, ProcessHandle, ProcessListener, ProcessStep, StepOutcome,
        Terminal,
    };
    pub use crate::profile::{ProfileManager, UserProfile};
    pub use crate::store::{StoreClient, StoreOps, VersionedContent};
}
