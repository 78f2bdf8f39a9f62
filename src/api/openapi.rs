use super::{
    error::ErrorBody,
    handlers::{
        admin::{self, analytics, audit, cases, consents, login},
        content, health, register, track,
    },
};
use crate::storage::{
    AnalyticsSummary, AuditRecord, CaseRecord, CaseUpdate, CaseUpsert, ConsentRecord,
    ContentEntry, DailyCount, LabelCount,
};
use utoipa::{
    openapi::{
        security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
        Contact, InfoBuilder, License, Tag,
    },
    OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        register::register,
        track::track,
        content::content,
        login::login,
        login::logout,
        admin::content::list,
        admin::content::upsert,
        admin::content::remove,
        consents::list,
        consents::export,
        cases::list,
        cases::update,
        cases::batch,
        cases::remove,
        audit::list,
        analytics::summary,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        register::RegisterRequest,
        register::RegisterResponse,
        track::TrackRequest,
        track::TrackResponse,
        login::LoginRequest,
        login::LoginResponse,
        admin::content::ContentValue,
        cases::CaseBatch,
        cases::CaseBatchResponse,
        ContentEntry,
        ConsentRecord,
        CaseRecord,
        CaseUpdate,
        CaseUpsert,
        AuditRecord,
        AnalyticsSummary,
        LabelCount,
        DailyCount,
    ))
)]
struct ApiDoc;

/// The `OpenAPI` document served at `/api-docs/openapi.json`.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info = cargo_info();
    doc.tags = Some(vec![
        tag("leads", "Lead registration and consent capture"),
        tag("analytics", "Public event beacon"),
        tag("content", "Site copy"),
        tag("health", "Liveness and database status"),
        tag("admin", "Back office, shared-secret protected"),
    ]);

    let components = doc.components.get_or_insert_with(Default::default);
    components.add_security_scheme(
        "bearer",
        SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
    );
    components.add_security_scheme(
        "cookie",
        SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(admin::ADMIN_COOKIE))),
    );

    doc
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_info() -> utoipa::openapi::Info {
    // Use Cargo.toml metadata instead of the derive defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, rest)) => {
            let name = name.trim();
            let email = rest.trim_end_matches('>').trim();
            (
                (!name.is_empty()).then_some(name),
                (!email.is_empty()).then_some(email),
            )
        }
        None => {
            let name = author.trim();
            ((!name.is_empty()).then_some(name), None)
        }
    }
}
