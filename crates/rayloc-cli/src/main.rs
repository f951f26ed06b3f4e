//! The `rayloc` binary: read a request, locate, write the response.
//!
//! The process exit status is the locator exit code, so pipeline scripts can
//! branch on it without parsing the payload.

use std::fs;
use std::path::Path;

use clap::Parser;
use rayloc_algo::{Locator, UniformVelocityModel};
use rayloc_core::{CratonSet, ExitCode, LocError, ZoneStats};
use rayloc_io::{hydra, refdata, LocationRequest, LocationResponse};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod cli;

use cli::{Cli, Commands, Format};

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let code = match &cli.command {
        Commands::Locate {
            input,
            output,
            format,
            cratons,
            zones,
        } => run_locate(input, output.as_deref(), *format, cratons.as_deref(), zones.as_deref()),
    };
    std::process::exit(code);
}

fn run_locate(
    input: &Path,
    output: Option<&Path>,
    format: Format,
    cratons: Option<&Path>,
    zones: Option<&Path>,
) -> i32 {
    match locate_file(input, output, format, cratons, zones) {
        Ok(exit) => exit.code(),
        Err(err) => {
            error!("{err}");
            exit_for_error(&err).code()
        }
    }
}

/// Map a hard failure onto the pipeline's exit codes.
fn exit_for_error(err: &LocError) -> ExitCode {
    match err {
        LocError::BadEventInput(_) | LocError::Parse(_) | LocError::Io(_) => ExitCode::BadEventInput,
        LocError::BadTravelTimeData(_) => ExitCode::BadTravelTimeData,
        LocError::BadAuxData(_) => ExitCode::BadAuxData,
        LocError::BadDepth(_) => ExitCode::LocationFailed,
        _ => ExitCode::UnknownStatus,
    }
}

fn locate_file(
    input: &Path,
    output: Option<&Path>,
    format: Format,
    cratons: Option<&Path>,
    zones: Option<&Path>,
) -> Result<ExitCode, LocError> {
    let cratons = match cratons {
        Some(path) => refdata::load_cratons(path)?,
        None => CratonSet::default(),
    };
    let zones = match zones {
        Some(path) => refdata::load_zones(path)?,
        None => ZoneStats::new(),
    };

    let text = fs::read_to_string(input)?;
    let request = match format {
        Format::Json => LocationRequest::from_json(&text)?,
        Format::Hydra => hydra::read_request(&text)?,
    };
    let (mut ev, options) = request.build_event()?;

    let model = UniformVelocityModel::default();
    let locator = Locator::new(&model, &cratons, &zones);
    let outcome = locator.locate(&mut ev, &options)?;

    let rendered = match format {
        Format::Json => LocationResponse::build(&ev, &outcome).to_json()?,
        Format::Hydra => hydra::write_summary(&ev, &outcome),
    };
    match output {
        Some(path) => {
            fs::write(path, rendered)?;
            info!("wrote {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(outcome.exit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn request_text() -> String {
        let mut picks = Vec::new();
        for i in 0..10 {
            let bearing = (i as f64 / 10.0) * std::f64::consts::TAU;
            let lat = 45.0 + 3.0 * bearing.cos();
            let lon = 3.0 * bearing.sin() / 45.0f64.to_radians().cos();
            let delta_km = 3.0 * rayloc_core::DEG2KM;
            let tt = (delta_km * delta_km + 100.0).sqrt() / 6.0;
            picks.push(serde_json::json!({
                "pickId": format!("p{i}"),
                "station": format!("S{i:02}"),
                "network": "SY",
                "stationLatitude": lat,
                "stationLongitude": lon,
                "originalPhase": "P",
                "arrivalTime": 600.0 + tt,
                "authorType": "LOCAL_HUMAN"
            }));
        }
        serde_json::json!({
            "originTime": 600.2,
            "latitude": 45.05,
            "longitude": 0.02,
            "depth": 12.0,
            "noSvd": true,
            "picks": picks
        })
        .to_string()
    }

    #[test]
    fn locate_file_end_to_end() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        input.write_all(request_text().as_bytes()).unwrap();
        let output = tempfile::NamedTempFile::new().unwrap();

        let exit = locate_file(
            input.path(),
            Some(output.path()),
            Format::Json,
            None,
            None,
        )
        .unwrap();
        assert!(matches!(
            exit,
            ExitCode::SuccessfulLocation | ExitCode::DidNotMove
        ));

        let response: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.path()).unwrap()).unwrap();
        assert!(response["qualityFlags"].is_string());
        assert_eq!(response["picks"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn malformed_input_maps_to_110() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        input.write_all(b"{ not json").unwrap();
        let err = locate_file(input.path(), None, Format::Json, None, None).unwrap_err();
        assert_eq!(exit_for_error(&err), ExitCode::BadEventInput);
        assert_eq!(exit_for_error(&err).code(), 110);
    }

    #[test]
    fn missing_aux_data_maps_to_114() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        input.write_all(request_text().as_bytes()).unwrap();
        let err = locate_file(
            input.path(),
            None,
            Format::Json,
            Some(Path::new("/nonexistent/cratons.json")),
            None,
        )
        .unwrap_err();
        assert_eq!(exit_for_error(&err).code(), 114);
    }
}
