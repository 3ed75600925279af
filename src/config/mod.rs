pub mod config_base;
pub mod connection;
pub mod default_privileges;
pub mod group;
pub mod membership;
pub mod role;
pub mod role_grant;
pub mod user;

pub use config_base::Config;
pub use connection::{Connection, ConnectionType, DataApi, TemporaryCredentials};
pub use default_privileges::{DefaultPrivileges, Grantee};
pub use group::Group;
pub use membership::GroupMembership;
pub use role::Role;
pub use role_grant::RoleGrant;
pub use user::User;
