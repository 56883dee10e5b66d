use anyhow::Result;
use async_trait::async_trait;

use hostline_agent::ReservationNotifier;
use hostline_core::config::AppConfig;
use hostline_core::domain::reservation::Reservation;
use hostline_voice::TwilioClient;

/// Texts the caller a confirmation after a booking.
pub struct SmsConfirmation {
    client: TwilioClient,
    from: String,
    restaurant: String,
}

impl SmsConfirmation {
    /// Only when confirmations are enabled and both a client and a from-number exist.
    pub fn from_config(config: &AppConfig, client: Option<&TwilioClient>) -> Option<Self> {
        if !config.telephony.sms_confirmations {
            return None;
        }
        let from = config.telephony.phone_number.clone()?;
        Some(Self { client: client?.clone(), from, restaurant: config.restaurant.name.clone() })
    }

    pub fn message_for(&self, reservation: &Reservation) -> String {
        format!(
            "{}: your table for {} on {} is confirmed. Reservation #{}.",
            self.restaurant,
            reservation.party_size,
            reservation.reservation_at.format("%A, %B %-d at %-I:%M %p"),
            reservation.id.0
        )
    }
}

#[async_trait]
impl ReservationNotifier for SmsConfirmation {
    async fn reservation_confirmed(&self, reservation: &Reservation) -> Result<()> {
        let body = self.message_for(reservation);
        self.client.send_sms(&reservation.customer_phone, &self.from, &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use secrecy::SecretString;

    use hostline_core::config::AppConfig;
    use hostline_core::domain::reservation::{Reservation, ReservationId, ReservationStatus};
    use hostline_voice::TwilioClient;

    use super::SmsConfirmation;

    fn client() -> TwilioClient {
        TwilioClient::new("AC123", "AC123", SecretString::from("token".to_owned()))
            .expect("client")
    }

    #[test]
    fn disabled_or_numberless_config_sends_nothing() {
        let mut config = AppConfig::default();
        assert!(SmsConfirmation::from_config(&config, Some(&client())).is_none());

        config.telephony.sms_confirmations = true;
        assert!(SmsConfirmation::from_config(&config, Some(&client())).is_none());

        config.telephony.phone_number = Some("+15551234567".to_owned());
        assert!(SmsConfirmation::from_config(&config, None).is_none());
        assert!(SmsConfirmation::from_config(&config, Some(&client())).is_some());
    }

    #[test]
    fn confirmation_text_names_party_and_time() {
        let mut config = AppConfig::default();
        config.telephony.sms_confirmations = true;
        config.telephony.phone_number = Some("+15551234567".to_owned());
        let notifier = SmsConfirmation::from_config(&config, Some(&client())).expect("notifier");

        let at = NaiveDate::from_ymd_opt(2026, 6, 12)
            .and_then(|date| date.and_hms_opt(19, 30, 0))
            .expect("timestamp");
        let reservation = Reservation {
            id: ReservationId(42),
            customer_name: "Asha".to_owned(),
            customer_phone: "+15550001111".to_owned(),
            customer_email: None,
            party_size: 4,
            reservation_at: at,
            special_requests: None,
            status: ReservationStatus::Confirmed,
            created_at: at,
            updated_at: at,
            tables: Vec::new(),
        };

        assert_eq!(
            notifier.message_for(&reservation),
            "Taste of India: your table for 4 on Friday, June 12 at 7:30 PM is confirmed. Reservation #42."
        );
    }
}
