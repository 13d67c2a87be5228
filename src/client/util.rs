// src/client/util.rs
use std::io;
use std::net::UdpSocket;

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Timelike};

pub(crate) fn local_datetime(ts: i64) -> DateTime<Local> {
    Local
        .timestamp_opt(ts, 0)
        .earliest()
        .unwrap_or_else(|| Local.timestamp_opt(0, 0).unwrap())
}

fn to_ts(naive: NaiveDateTime) -> i64 {
    match Local.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.timestamp(),
        None => naive.and_utc().timestamp(),
    }
}

/// Drop the seconds from a local timestamp.
pub(crate) fn zero_seconds(ts: i64) -> i64 {
    let dt = local_datetime(ts);
    to_ts(dt.naive_local().with_second(0).unwrap_or(dt.naive_local()))
}

/// Combine the calendar date of `day_ts` with the local time-of-day of
/// `time_ts`, seconds zeroed. Used to anchor a recurring rule on its first
/// day.
pub(crate) fn combine_local(day_ts: i64, time_ts: i64) -> i64 {
    let day = local_datetime(day_ts).date_naive();
    let tod = local_datetime(time_ts).time();
    let naive = day.and_time(tod).with_second(0).unwrap_or(day.and_time(tod));
    to_ts(naive)
}

pub(crate) fn make_program_title(title: &str, subtitle: &str) -> String {
    // Must keep the original title at the beginning
    if subtitle.is_empty() {
        title.to_string()
    } else {
        format!("{title} ({subtitle})")
    }
}

/// Presentation time of a recording. The air date is usually a bare date, so
/// the time-of-day is taken from the actual recording time; sorting by the
/// result then reflects episode order.
pub(crate) fn recording_time(air_ts: i64, recording_ts: i64, use_airdate: bool) -> i64 {
    if !use_airdate || air_ts == 0 {
        return recording_ts;
    }
    let air = local_datetime(air_ts);
    let rec = local_datetime(recording_ts);
    let mut date = air.date_naive();
    if air.ordinal0() == 0 {
        // Air date collapsed to January 1st: keep the recording's day
        date = date
            .with_month(rec.month())
            .and_then(|d| d.with_day(rec.day()))
            .unwrap_or(date);
    }
    to_ts(date.and_time(rec.time()))
}

fn parse_ether(ether: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut n = 0;
    for part in ether.split([':', '-']) {
        if n == 6 {
            return None;
        }
        mac[n] = u8::from_str_radix(part, 16).ok()?;
        n += 1;
    }
    (n == 6).then_some(mac)
}

/// Send a wake-on-LAN magic packet to the backend host.
pub(crate) fn wake_on_lan(ether: &str) -> io::Result<()> {
    let mac = parse_ether(ether)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "bad hardware address"))?;
    let mut packet = [0xFFu8; 102];
    for chunk in packet[6..].chunks_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.set_broadcast(true)?;
    socket.send_to(&packet, ("255.255.255.255", 9))?;
    Ok(())
}
