//! Application assembly: auth runtime, services and the merged router.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::auth::local::LocalSessionProvider;
use crate::auth::profile::ProfileStore;
use crate::auth::runtime::AuthRuntime;
use crate::config::GateConfig;
use crate::drafts::routes::{DraftRouteState, draft_routes};
use crate::drafts::store::DraftStorage;
use crate::gate::requirement::RouteTable;
use crate::gate::routes::{GateRouteState, gate_routes};
use crate::onboarding::routes::{OnboardingRouteState, onboarding_routes};
use crate::onboarding::service::OnboardingService;

/// A running application.
pub struct App {
    pub runtime: Arc<AuthRuntime>,
    pub sessions: Arc<LocalSessionProvider>,
    pub router: Router,
}

impl App {
    /// Start the auth runtime and build the HTTP router. Must run inside a
    /// tokio runtime.
    pub fn start(
        config: GateConfig,
        profiles: Arc<dyn ProfileStore>,
        drafts: Arc<dyn DraftStorage>,
    ) -> Self {
        let sessions = LocalSessionProvider::new();
        let runtime = Arc::new(AuthRuntime::start(
            sessions.clone(),
            Arc::clone(&profiles),
            &config,
        ));

        let routes = RouteTable::standard(&config.paths);
        for (pattern, problem) in routes.validate() {
            warn!(pattern = %pattern, problem = %problem, "Misconfigured route");
        }

        let service = Arc::new(OnboardingService::new(
            profiles,
            Arc::clone(&drafts),
            Arc::clone(&runtime.profiles),
            config.clone(),
        ));
        let settle_limit = config.session_timeout + config.profile_timeout;

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = gate_routes(GateRouteState {
            runtime: Arc::clone(&runtime),
            sessions: Arc::clone(&sessions),
            routes: Arc::new(routes),
            config: config.clone(),
        })
        .merge(draft_routes(DraftRouteState {
            storage: drafts,
            product: config.product.clone(),
        }))
        .merge(onboarding_routes(OnboardingRouteState {
            service,
            runtime: Arc::clone(&runtime),
            settle_limit,
        }))
        .layer(cors);

        Self {
            runtime,
            sessions,
            router,
        }
    }
}
