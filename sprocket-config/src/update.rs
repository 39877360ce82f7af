//! Configuration updates emitted after provisioning.

use std::collections::BTreeMap;

/// Ordered set of configuration values to apply.
pub type EnvUpdate = BTreeMap<String, String>;

/// Receives new configuration values so the host process can apply or persist
/// them. Sprocket never writes them anywhere itself.
pub trait EnvUpdater: Send + Sync {
    fn update_env(&self, env: &EnvUpdate);
}

impl<F> EnvUpdater for F
where
    F: Fn(&EnvUpdate) + Send + Sync,
{
    fn update_env(&self, env: &EnvUpdate) {
        self(env)
    }
}
