use std::sync::Arc;

use log::info;
use patient_email_app::{
    build_plugin,
    domain::{
        OrganizationId, PatientId, profile::InMemoryProfileRepository,
        template::InMemoryTemplateRepository,
    },
    extension::{ExtensionRegistry, HostModel, PATIENT_MODEL, register_patient_email},
    patient::PatientEmailExt,
    ports::patient::{InMemoryPatientDirectory, PatientSummary},
};
use patient_email_lettre::{LettreEmailAdapter, SmtpConfig};

mod logs;

const USAGE: &str = "usage: patient-email <address> <subject> <body>";

fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    logs::init_logger();

    let mut args = std::env::args().skip(1);
    let (Some(address), Some(subject)) = (args.next(), args.next()) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let body = args.collect::<Vec<_>>().join(" ");

    let config = SmtpConfig::from_env().expect("Invalid SMTP configuration");
    let email_adapter =
        Arc::new(LettreEmailAdapter::new(&config).expect("Failed to create SMTP transport"));

    let patient = PatientSummary {
        id: PatientId(1),
        full_name: "Command Line Patient".to_string(),
        organization: OrganizationId(1),
    };
    let directory = Arc::new(InMemoryPatientDirectory::new());
    directory.insert(patient.clone(), true);

    let plugin = build_plugin(
        email_adapter,
        Arc::new(InMemoryProfileRepository::new()),
        Arc::new(InMemoryTemplateRepository::new()),
        directory,
    );

    let registry = ExtensionRegistry::new();
    registry.declare_model(HostModel::new(
        PATIENT_MODEL,
        Some("id"),
        &["id", "full_name", "organization"],
    ));
    register_patient_email(&registry, &plugin)
        .expect("Failed to register patient email extension");

    let patient = patient.with_email(&plugin);
    if let Err(e) = patient.set_email(&address) {
        log::error!("Rejected address {:?}: {}", address, e);
        std::process::exit(1);
    }

    info!("Sending email to {}", address);
    match patient.send_email(&subject, &body) {
        Ok(receipt) => {
            println!("Sent to {} at {}", receipt.recipient, receipt.sent_at);
        }
        Err(e) => {
            log::error!("Failed to send email: {}", e);
            std::process::exit(1);
        }
    }
}
