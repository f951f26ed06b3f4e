//! Legacy Hydra-style text format.
//!
//! Fixed-order whitespace-delimited records, one event per file: a header
//! line with the hypocenter guess and the run flags, then one line per pick.
//! Everything the JSON payload carries is representable; the format exists
//! for the legacy pipelines that still speak it.
//!
//! ```text
//! 600.000 45.0000 0.0000 10.00 F F F 0.00 0.00 F F
//! p1 AAA BHZ XX -- 49.0000 0.0000 0.000 0.20 P 674.000 T LOCAL_HUMAN 1.0
//! ```

use chrono::DateTime;
use rayloc_core::{AuthorType, Event, LocError, LocResult};

use crate::json::{LocationRequest, PickInput};
use rayloc_algo::LocateOutcome;

fn flag(b: bool) -> &'static str {
    if b {
        "T"
    } else {
        "F"
    }
}

fn parse_flag(tok: &str) -> LocResult<bool> {
    match tok {
        "T" | "t" | "1" => Ok(true),
        "F" | "f" | "0" => Ok(false),
        other => Err(LocError::BadEventInput(format!("bad flag '{other}'"))),
    }
}

fn parse_f64(tok: &str, what: &str) -> LocResult<f64> {
    tok.parse()
        .map_err(|_| LocError::BadEventInput(format!("bad {what} '{tok}'")))
}

fn author_code(author: AuthorType) -> &'static str {
    match author {
        AuthorType::Unknown => "UNKNOWN",
        AuthorType::LocalHuman => "LOCAL_HUMAN",
        AuthorType::LocalAuto => "LOCAL_AUTO",
        AuthorType::ContribHuman => "CONTRIB_HUMAN",
        AuthorType::ContribAuto => "CONTRIB_AUTO",
    }
}

fn parse_author(tok: &str) -> AuthorType {
    match tok {
        "LOCAL_HUMAN" => AuthorType::LocalHuman,
        "LOCAL_AUTO" => AuthorType::LocalAuto,
        "CONTRIB_HUMAN" => AuthorType::ContribHuman,
        "CONTRIB_AUTO" => AuthorType::ContribAuto,
        _ => AuthorType::Unknown,
    }
}

/// Parse a Hydra-style request.
pub fn read_request(text: &str) -> LocResult<LocationRequest> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| LocError::BadEventInput("empty hydra file".into()))?;
    let tok: Vec<&str> = header.split_whitespace().collect();
    if tok.len() != 11 {
        return Err(LocError::BadEventInput(format!(
            "hydra header has {} fields, expected 11",
            tok.len()
        )));
    }

    let mut request = LocationRequest {
        origin_time: parse_f64(tok[0], "origin time")?,
        latitude: parse_f64(tok[1], "latitude")?,
        longitude: parse_f64(tok[2], "longitude")?,
        depth: parse_f64(tok[3], "depth")?,
        held_loc: parse_flag(tok[4])?,
        held_depth: parse_flag(tok[5])?,
        pref_depth: parse_flag(tok[6])?,
        bayes_depth: parse_f64(tok[7], "bayes depth")?,
        bayes_spread: parse_f64(tok[8], "bayes spread")?,
        use_rstt: parse_flag(tok[9])?,
        no_svd: parse_flag(tok[10])?,
        new_loc: true,
        picks: Vec::new(),
    };

    for (n, line) in lines.enumerate() {
        let tok: Vec<&str> = line.split_whitespace().collect();
        if tok.len() != 14 {
            return Err(LocError::BadEventInput(format!(
                "hydra pick line {} has {} fields, expected 14",
                n + 2,
                tok.len()
            )));
        }
        request.picks.push(PickInput {
            source: String::new(),
            pick_id: tok[0].to_string(),
            station: tok[1].to_string(),
            channel: tok[2].to_string(),
            network: tok[3].to_string(),
            location: if tok[4] == "--" {
                String::new()
            } else {
                tok[4].to_string()
            },
            station_latitude: parse_f64(tok[5], "station latitude")?,
            station_longitude: parse_f64(tok[6], "station longitude")?,
            station_elevation: parse_f64(tok[7], "station elevation")?,
            quality: parse_f64(tok[8], "quality")?,
            original_phase: tok[9].to_string(),
            arrival_time: parse_f64(tok[10], "arrival time")?,
            use_pick: parse_flag(tok[11])?,
            author_type: parse_author(tok[12]),
            locator_phase: String::new(),
            pick_affinity: parse_f64(tok[13], "affinity")?,
        });
    }
    Ok(request)
}

/// Render a request back into Hydra text.
pub fn write_request(request: &LocationRequest) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:.3} {:.4} {:.4} {:.2} {} {} {} {:.2} {:.2} {} {}\n",
        request.origin_time,
        request.latitude,
        request.longitude,
        request.depth,
        flag(request.held_loc),
        flag(request.held_depth),
        flag(request.pref_depth),
        request.bayes_depth,
        request.bayes_spread,
        flag(request.use_rstt),
        flag(request.no_svd),
    ));
    for pick in &request.picks {
        out.push_str(&format!(
            "{} {} {} {} {} {:.4} {:.4} {:.3} {:.2} {} {:.3} {} {} {:.1}\n",
            pick.pick_id,
            pick.station,
            if pick.channel.is_empty() { "---" } else { &pick.channel },
            pick.network,
            if pick.location.is_empty() { "--" } else { &pick.location },
            pick.station_latitude,
            pick.station_longitude,
            pick.station_elevation,
            pick.quality,
            if pick.original_phase.is_empty() { "?" } else { &pick.original_phase },
            pick.arrival_time,
            flag(pick.use_pick),
            author_code(pick.author_type),
            pick.pick_affinity,
        ));
    }
    out
}

/// Render a finished location as the legacy single-event summary.
pub fn write_summary(ev: &Event, outcome: &LocateOutcome) -> String {
    let origin = {
        let secs = ev.hypo.origin_time.floor() as i64;
        let nanos = ((ev.hypo.origin_time - secs as f64) * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
            .map(|dt| dt.format("%Y/%m/%d %H:%M:%S%.2f").to_string())
            .unwrap_or_else(|| format!("{:.3}", ev.hypo.origin_time))
    };
    let stats = &outcome.stats;
    let mut out = format!(
        "{origin} {:8.4} {:9.4} {:6.2} {:3} {:3} {:5.1} {:5.1} [{}] exit {}\n",
        ev.hypo.latitude,
        ev.hypo.longitude,
        ev.hypo.depth,
        ev.stations_used(),
        ev.phases_used(),
        outcome.coverage.azim_gap,
        outcome.coverage.lest_gap,
        outcome.quality,
        outcome.exit.code(),
    );
    out.push_str(&format!(
        "errors: seT {:.2} seLat {:.2} seLon {:.2} seZ {:.2} errH {:.2} errZ {:.2} aveH {:.2}\n",
        stats.se_time, stats.se_lat, stats.se_lon, stats.se_depth, stats.err_h, stats.err_z,
        stats.ave_h,
    ));
    for g in ev.groups_by_delta() {
        let group = &ev.groups[g];
        let station = ev.station(group.station);
        for &p in &group.picks {
            let pick = ev.pick(p);
            out.push_str(&format!(
                "{:<6} {:<8} {:6.2} {:6.1} {:8.2} {:5.2} {:6.4} {}\n",
                station.key.station,
                pick.phase,
                group.delta,
                group.azimuth,
                pick.residual,
                pick.weight,
                pick.importance,
                if pick.used { "used" } else { "    " },
            ));
        }
    }
    out
}
