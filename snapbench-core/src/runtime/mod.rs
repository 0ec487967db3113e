//! Container runtime adapter.
//!
//! Image pull and container run built on the runtime's client tooling,
//! parameterised by the image-pull backend.

mod api;
mod client;
mod credentials;
mod ctr;

pub use api::{Image, PullRequest, RuntimeApi};
pub use client::{
    auth_from_config, ContainerIdGenerator, LazyPullBackend, ReadyContainer, RuntimeClient,
    DEFAULT_SNAPSHOTTER,
};
pub use credentials::{PullAuth, RegistryCredentials};
pub use ctr::CtrCli;
