/// Fixtures shared by unit tests
use crate::{
    account::{Profile, Role},
    property::{Property, Unit},
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Insert a profile directly, skipping password hashing
pub async fn seed_profile(db: &SqlitePool, email: &str, role: Role) -> Profile {
    let profile = Profile {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        password_hash: "$argon2id$fixture".to_string(),
        role,
        full_name: format!("{} user", role.as_str()),
        phone: Some("0712345678".to_string()),
        property_id: None,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO profiles (id, email, password_hash, role, full_name, phone, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&profile.id)
    .bind(&profile.email)
    .bind(&profile.password_hash)
    .bind(role.as_str())
    .bind(&profile.full_name)
    .bind(&profile.phone)
    .bind(profile.created_at)
    .execute(db)
    .await
    .unwrap();

    profile
}

pub async fn seed_property(db: &SqlitePool, landlord_id: &str, name: &str) -> Property {
    let now = Utc::now();
    let property = Property {
        id: Uuid::new_v4().to_string(),
        landlord_id: landlord_id.to_string(),
        name: name.to_string(),
        address: "Ngong Road, Nairobi".to_string(),
        description: None,
        unit_count: 0,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO properties (id, landlord_id, name, address, description, unit_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5, ?5)",
    )
    .bind(&property.id)
    .bind(&property.landlord_id)
    .bind(&property.name)
    .bind(&property.address)
    .bind(now)
    .execute(db)
    .await
    .unwrap();

    property
}

/// Insert a unit (rent 15000, due on the 5th) and bump the property count
pub async fn seed_unit(
    db: &SqlitePool,
    property_id: &str,
    unit_number: &str,
    tenant_id: Option<&str>,
) -> Unit {
    let now = Utc::now();
    let unit = Unit {
        id: Uuid::new_v4().to_string(),
        property_id: property_id.to_string(),
        unit_number: unit_number.to_string(),
        tenant_id: tenant_id.map(str::to_string),
        rent_amount: 15000,
        due_day: 5,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO units (id, property_id, unit_number, tenant_id, rent_amount, due_day, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
    )
    .bind(&unit.id)
    .bind(&unit.property_id)
    .bind(&unit.unit_number)
    .bind(&unit.tenant_id)
    .bind(unit.rent_amount)
    .bind(unit.due_day)
    .bind(now)
    .execute(db)
    .await
    .unwrap();

    sqlx::query("UPDATE properties SET unit_count = unit_count + 1 WHERE id = ?1")
        .bind(property_id)
        .execute(db)
        .await
        .unwrap();

    unit
}

/// Station a guard at a property
pub async fn station_guard(db: &SqlitePool, guard: &mut Profile, property_id: &str) {
    sqlx::query("UPDATE profiles SET property_id = ?1 WHERE id = ?2")
        .bind(property_id)
        .bind(&guard.id)
        .execute(db)
        .await
        .unwrap();
    guard.property_id = Some(property_id.to_string());
}

/// Provider double: accepts every push with fresh ids, or fails with a message
pub struct FakeProvider {
    pub failure: Option<String>,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl FakeProvider {
    pub fn accepting() -> Self {
        Self {
            failure: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl crate::payment::PushPaymentProvider for FakeProvider {
    async fn initiate_push(
        &self,
        _settings: &crate::payment::PaymentSettings,
        _request: &crate::payment::provider::PushRequest,
    ) -> crate::error::PortalResult<crate::payment::provider::PushAccepted> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(crate::error::PortalError::Provider(message.clone())),
            None => Ok(crate::payment::provider::PushAccepted {
                merchant_request_id: format!("mr-{}", Uuid::new_v4()),
                checkout_request_id: format!("ws_CO_{}", Uuid::new_v4().simple()),
                customer_message: Some("Success. Request accepted for processing".to_string()),
            }),
        }
    }
}

/// Enable payments for a property with sandbox credentials
pub async fn seed_payment_settings(db: &SqlitePool, property_id: &str, enabled: bool) {
    sqlx::query(
        "INSERT INTO payment_settings (property_id, enabled, environment, shortcode, passkey, consumer_key, consumer_secret, transaction_type, updated_at)
         VALUES (?1, ?2, 'sandbox', '174379', 'passkey', 'key', 'secret', 'CustomerPayBillOnline', ?3)",
    )
    .bind(property_id)
    .bind(enabled)
    .bind(Utc::now())
    .execute(db)
    .await
    .unwrap();
}
