// --- File: crates/services/darsly_backend/src/service_factory.rs ---
//! Service factory implementation.
//!
//! Wires the concrete external collaborators: the Tamara gateway client plus
//! the side-effect dispatchers. The chat/notification/rewards services are
//! log-only stand-ins for the surrounding platform services, which consume
//! the core through these traits.

use darsly_common::services::{
    BoxFuture, BoxedError, ChatRoomService, InstallmentGateway, NotificationService, RateCard,
    RateProvider, RewardsService, ServiceFactory,
};
use darsly_config::AppConfig;
use darsly_tamara::TamaraClient;
use std::sync::Arc;
use tracing::{error, info};

/// Service factory for the backend binary.
pub struct DarslyServiceFactory {
    #[allow(dead_code)]
    config: Arc<AppConfig>,
    gateway: Option<Arc<dyn InstallmentGateway>>,
    chat_rooms: Arc<dyn ChatRoomService>,
    notifications: Arc<dyn NotificationService>,
    rewards: Arc<dyn RewardsService>,
    rates: Arc<dyn RateProvider>,
}

impl DarslyServiceFactory {
    /// Create a new service factory from the application configuration.
    pub fn new(config: Arc<AppConfig>) -> Self {
        let gateway: Option<Arc<dyn InstallmentGateway>> = match config.tamara.as_ref() {
            Some(tamara_config) => match TamaraClient::from_env(tamara_config) {
                Ok(client) => {
                    info!("Tamara gateway client initialized");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    // Fail fast on credentials: better no payment surface
                    // than one that errors on every checkout.
                    error!("Tamara gateway not available: {}", e);
                    None
                }
            },
            None => None,
        };

        Self {
            config: config.clone(),
            gateway,
            chat_rooms: Arc::new(LoggingChatRoomService),
            notifications: Arc::new(LoggingNotificationService),
            rewards: Arc::new(LoggingRewardsService),
            rates: Arc::new(ConfigRateProvider { config }),
        }
    }
}

impl ServiceFactory for DarslyServiceFactory {
    fn gateway(&self) -> Option<Arc<dyn InstallmentGateway>> {
        self.gateway.clone()
    }

    fn chat_room_service(&self) -> Option<Arc<dyn ChatRoomService>> {
        Some(self.chat_rooms.clone())
    }

    fn notification_service(&self) -> Option<Arc<dyn NotificationService>> {
        Some(self.notifications.clone())
    }

    fn rewards_service(&self) -> Option<Arc<dyn RewardsService>> {
        Some(self.rewards.clone())
    }

    fn rate_provider(&self) -> Option<Arc<dyn RateProvider>> {
        Some(self.rates.clone())
    }
}

/// Stand-in chat-room dispatcher: logs what the platform chat service will
/// receive once it is connected.
struct LoggingChatRoomService;

impl ChatRoomService for LoggingChatRoomService {
    fn create_room(
        &self,
        booking_id: &str,
        teacher_id: &str,
        student_id: &str,
    ) -> BoxFuture<'_, (), BoxedError> {
        let booking_id = booking_id.to_string();
        let teacher_id = teacher_id.to_string();
        let student_id = student_id.to_string();
        Box::pin(async move {
            info!(
                "chat room requested: booking={}, teacher={}, student={}",
                booking_id, teacher_id, student_id
            );
            Ok(())
        })
    }
}

/// Stand-in notification dispatcher.
struct LoggingNotificationService;

impl NotificationService for LoggingNotificationService {
    fn send_email(&self, to: &str, subject: &str, _body: &str) -> BoxFuture<'_, (), BoxedError> {
        let to = to.to_string();
        let subject = subject.to_string();
        Box::pin(async move {
            info!("email requested: to={}, subject='{}'", to, subject);
            Ok(())
        })
    }

    fn send_sms(&self, to: &str, _body: &str) -> BoxFuture<'_, (), BoxedError> {
        let to = to.to_string();
        Box::pin(async move {
            info!("sms requested: to={}", to);
            Ok(())
        })
    }
}

/// Stand-in rewards dispatcher.
struct LoggingRewardsService;

impl RewardsService for LoggingRewardsService {
    fn award_points(
        &self,
        user_id: &str,
        points: i64,
        reason: &str,
    ) -> BoxFuture<'_, (), BoxedError> {
        let user_id = user_id.to_string();
        let reason = reason.to_string();
        Box::pin(async move {
            info!("points requested: user={}, points={}, reason='{}'", user_id, points, reason);
            Ok(())
        })
    }
}

/// Rate provider backed by the booking price tiers in configuration.
///
/// Production deployments swap this for the profile service; the lookup
/// contract stays the same.
struct ConfigRateProvider {
    config: Arc<AppConfig>,
}

impl RateProvider for ConfigRateProvider {
    fn unit_price(
        &self,
        _teacher_id: &str,
        subject_id: Option<&str>,
    ) -> BoxFuture<'_, RateCard, BoxedError> {
        let subject_id = subject_id.map(|s| s.to_string());
        Box::pin(async move {
            let booking = self.config.booking.as_ref();

            let tier = booking.and_then(|b| {
                b.price_tiers
                    .iter()
                    .find(|t| t.subject_id.as_deref() == subject_id.as_deref())
                    .or_else(|| b.price_tiers.iter().find(|t| t.subject_id.is_none()))
            });

            let default_currency = booking
                .and_then(|b| b.default_currency.clone())
                .or_else(|| self.config.tamara.as_ref().and_then(|t| t.currency.clone()))
                .unwrap_or_else(|| "AED".to_string());

            match tier {
                Some(tier) => Ok(RateCard {
                    unit_amount: tier.unit_amount,
                    currency: tier.currency.clone().unwrap_or(default_currency),
                    product_name: tier.product_name.clone(),
                }),
                None => Ok(RateCard {
                    unit_amount: booking.map(|b| b.default_unit_amount).unwrap_or(5000),
                    currency: default_currency,
                    product_name: None,
                }),
            }
        })
    }
}
