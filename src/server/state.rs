use std::sync::Arc;
use std::time::Instant;

use crate::auth::{HubTokenIssuer, JwtValidator};
use crate::config::Settings;
use crate::connection_manager::{ConnectionRegistry, GroupRegistry};
use crate::hub::ChatHub;
use crate::membership::ChannelMembershipCache;
use crate::notification::NotificationDispatcher;
use crate::presence::PresenceCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub token_issuer: Arc<HubTokenIssuer>,
    pub registry: Arc<ConnectionRegistry>,
    pub groups: Arc<GroupRegistry>,
    pub membership: Arc<ChannelMembershipCache>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub presence: Arc<PresenceCoordinator>,
    pub hub: Arc<ChatHub>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));
        let token_issuer = Arc::new(HubTokenIssuer::new(&settings.jwt));

        let registry = Arc::new(ConnectionRegistry::new());
        let groups = Arc::new(GroupRegistry::new());
        let membership = Arc::new(ChannelMembershipCache::new(settings.membership.ttl()));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            registry.clone(),
            groups.clone(),
            membership.clone(),
        ));
        let presence = Arc::new(PresenceCoordinator::new(
            registry.clone(),
            groups.clone(),
            dispatcher.clone(),
        ));
        let hub = Arc::new(ChatHub::new(
            groups.clone(),
            presence.clone(),
            dispatcher.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            token_issuer,
            registry,
            groups,
            membership,
            dispatcher,
            presence,
            hub,
            start_time: Instant::now(),
        }
    }
}
