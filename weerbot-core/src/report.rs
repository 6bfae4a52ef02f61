//! Rendering of the Telegram weather reports.
//!
//! Both templates are plain functions of a [`WeatherSnapshot`] and a
//! [`UvReading`]; fetching happens before rendering, so a report is either
//! complete or not produced at all.

use std::fmt::Write;

use crate::model::{ReportKind, UvReading, WeatherSnapshot};

/// Map a weerlive image code to an emoji. Unknown codes are returned as-is.
pub fn weather_icon(image: &str) -> &str {
    match image {
        "zonnig" => "☀️",
        "bliksem" => "🌩️",
        "regen" => "🌧️",
        "buien" => "🌧️",
        "hagel" => "🌨️",
        "mist" => "🌫️",
        "sneeuw" => "🌨️",
        "bewolkt" => "☁️",
        "lichtbewolkt" => "🌤️",
        "halfbewolkt" => "🌥️",
        "halfbewolkt_regen" => "🌦️",
        "zwaarbewolkt" => "☁️☁️",
        "nachtmist" => "🌙🌫️",
        "helderenacht" => "🌙",
        "nachtbewolkt" => "🌙☁️",
        "wolkennacht" => "🌙☁️",
        other => other,
    }
}

pub fn format_report(kind: ReportKind, weather: &WeatherSnapshot, uv: &UvReading) -> String {
    match kind {
        ReportKind::Summary => format_summary(weather, uv),
        ReportKind::Details => format_detail(weather, uv),
    }
}

pub fn format_summary(weather: &WeatherSnapshot, uv: &UvReading) -> String {
    let mut out = String::new();

    // `write!` into a String cannot fail.
    let _ = write!(
        out,
        "{icon}  ({uv_icon}) - <b>{summary} - 🌡️ {temp}°C - 🍃 {wind} km/u</b>\n\
         \n\
         <b>Weer in het kort voor {time}</b>\n\
         \n\
         <b>In het kort:</b>\n\
         Samenvatting: {summary}\n\
         Temperatuur: {temp}°C\n\
         Gevoelstemperatuur: {feels}°C\n\
         UV-index: {uv} ({uv_label})\n\
         Max UV-index: {uv_max} ({uv_max_label}) (om {uv_max_time})\n\
         Veilige blootstellingstijd: {safe} min\n\
         Windrichting: {wind_dir}\n\
         Windsnelheid: {wind} km/u\n\
         Alert: {alarm}\n",
        icon = escape_html(weather_icon(&weather.image)),
        uv_icon = uv.severity.icon(),
        summary = escape_html(&weather.summary),
        temp = escape_html(&weather.temperature),
        wind = escape_html(&weather.wind_speed_kmh),
        time = escape_html(&weather.timestamp),
        feels = escape_html(&weather.feels_like),
        uv = uv.uv,
        uv_label = uv.severity.label(),
        uv_max = uv.uv_max,
        uv_max_label = uv.max_severity.label(),
        uv_max_time = uv.uv_max_time_local(),
        safe = safe_exposure(uv),
        wind_dir = escape_html(&weather.wind_direction),
        alarm = escape_html(&weather.alarm_text),
    );

    out
}

pub fn format_detail(weather: &WeatherSnapshot, uv: &UvReading) -> String {
    let mut out = String::new();

    let _ = write!(
        out,
        "{icon} ({uv_icon}) - <b>{summary} - 🌡️ {temp}°C - 🍃 {wind} km/u</b>\n\
         \n\
         <b>In het kort:</b>\n\
         Samenvatting: {summary}\n\
         Temperatuur: {temp}°C\n\
         UV-index: {uv} ({uv_label})\n\
         Veilige blootstellingstijd: {safe} min\n\
         Kans op regen: {rain}%\n\
         Windrichting: {wind_dir}\n\
         Windsnelheid: {wind} km/u\n\
         Alert: {alarm}\n\
         \n\
         <b>In detail vandaag:</b>\n\
         Gevoelstemperatuur: {feels}°C\n\
         Verwachting: {expectation}\n\
         Max temperatuur: {max}°C\n\
         Min temperatuur: {min}°C\n\
         Kans op regen: {rain}%\n\
         Kans op zon: {sun}%\n\
         Max UV-index: {uv_max} ({uv_max_label}) (om {uv_max_time})\n\
         Luchtvochtigheid: {humidity}%\n\
         Zonsopkomst: {sunrise}\n\
         Zonsondergang: {sunset}\n\
         \n\
         <b>Morgen:</b>\n\
         Max temperatuur: {t_max}°C\n\
         Min temperatuur: {t_min}°C\n\
         Kans op regen: {t_rain}%\n\
         Kans op zon: {t_sun}%\n",
        icon = escape_html(weather_icon(&weather.image)),
        uv_icon = uv.severity.icon(),
        summary = escape_html(&weather.summary),
        temp = escape_html(&weather.temperature),
        wind = escape_html(&weather.wind_speed_kmh),
        uv = uv.uv,
        uv_label = uv.severity.label(),
        safe = safe_exposure(uv),
        rain = escape_html(&weather.today.rain_chance),
        wind_dir = escape_html(&weather.wind_direction),
        alarm = escape_html(&weather.alarm_text),
        feels = escape_html(&weather.feels_like),
        expectation = escape_html(&weather.expectation),
        max = escape_html(&weather.today.max_temp),
        min = escape_html(&weather.today.min_temp),
        sun = escape_html(&weather.today.sun_chance),
        uv_max = uv.uv_max,
        uv_max_label = uv.max_severity.label(),
        uv_max_time = uv.uv_max_time_local(),
        humidity = escape_html(&weather.humidity),
        sunrise = escape_html(&weather.sunrise),
        sunset = escape_html(&weather.sunset),
        t_max = escape_html(&weather.tomorrow.max_temp),
        t_min = escape_html(&weather.tomorrow.min_temp),
        t_rain = escape_html(&weather.tomorrow.rain_chance),
        t_sun = escape_html(&weather.tomorrow.sun_chance),
    );

    out
}

fn safe_exposure(uv: &UvReading) -> String {
    match uv.safe_exposure_minutes {
        Some(minutes) => minutes.to_string(),
        None => "-".to_string(),
    }
}

/// Escape API text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
