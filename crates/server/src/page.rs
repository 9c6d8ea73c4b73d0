//! Server-rendered HTML: the dashboard shell and the login form.
//!
//! The dashboard polls the JSON API from the browser every 5 seconds.

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; background: #f4f6f8; color: #1f2933; }
header { display: flex; justify-content: space-between; align-items: center; padding: 12px 24px; background: #1f2933; color: #fff; }
header a { color: #cbd2d9; }
main { padding: 24px; max-width: 1100px; margin: 0 auto; }
.cards { display: grid; grid-template-columns: repeat(4, 1fr); gap: 16px; margin-bottom: 24px; }
.card { background: #fff; border-radius: 6px; padding: 16px; box-shadow: 0 1px 2px rgba(0,0,0,.08); }
.card .value { font-size: 1.6em; font-weight: 600; }
#alertBanner { display: none; background: #e12d39; color: #fff; padding: 12px 16px; border-radius: 6px; margin-bottom: 16px; }
table { width: 100%; border-collapse: collapse; background: #fff; }
th, td { padding: 6px 10px; border-bottom: 1px solid #e4e7eb; text-align: left; font-size: .9em; }
tr.anomaly td { color: #e12d39; font-weight: 600; }
form.login { max-width: 320px; margin: 80px auto; background: #fff; padding: 24px; border-radius: 6px; }
form.login input { width: 100%; margin-bottom: 12px; padding: 8px; box-sizing: border-box; }
.error { color: #e12d39; }
"#;

const SCRIPT: &str = r#"
const fmt = (v, d) => (v === null || v === undefined) ? '-' : Number(v).toFixed(d);

async function getJson(url) {
  const res = await fetch(url, { credentials: 'same-origin' });
  if (res.redirected) { window.location = res.url; return null; }
  return res.json();
}

async function refresh() {
  const [stats, data, anomalies, alert] = await Promise.all([
    getJson('/api/stats'), getJson('/api/data?limit=50'),
    getJson('/api/anomalies'), getJson('/api/current_alert'),
  ]);
  if (stats && stats.success) {
    const s = stats.stats;
    document.getElementById('totalRecords').textContent = s.total_records.toLocaleString();
    document.getElementById('totalAnomalies').textContent = s.total_anomalies.toLocaleString();
    document.getElementById('avgPower').textContent = fmt(s.avg_power, 2);
    document.getElementById('avgVoltage').textContent = fmt(s.avg_voltage, 1);
  }
  if (data && data.success) {
    document.getElementById('readings').innerHTML = data.data.map(r =>
      `<tr class="${r.is_anomaly ? 'anomaly' : ''}"><td>${r.timestamp}</td><td>${fmt(r.global_active_power, 3)}</td>` +
      `<td>${fmt(r.voltage, 1)}</td><td>${fmt(r.global_intensity, 1)}</td><td>${fmt(r.anomaly_score, 4)}</td></tr>`).join('');
  }
  if (anomalies && anomalies.success) {
    document.getElementById('anomalyCount').textContent = anomalies.anomalies.length;
    document.getElementById('anomalies').innerHTML = anomalies.anomalies.map(a =>
      `<tr><td>${a.timestamp}</td><td>${fmt(a.power, 3)}</td><td>${fmt(a.voltage, 1)}</td>` +
      `<td>${fmt(a.score, 4)}</td><td>${a.scored_at || '-'}</td></tr>`).join('');
  }
  const banner = document.getElementById('alertBanner');
  if (alert && alert.has_alert) {
    banner.textContent = `Anomaly at ${alert.timestamp}: ${fmt(alert.power, 2)} kW, ${fmt(alert.voltage, 1)} V (score ${fmt(alert.score, 4)})`;
    banner.style.display = 'block';
  } else {
    banner.style.display = 'none';
  }
  document.getElementById('lastUpdate').textContent = new Date().toLocaleTimeString();
}

refresh();
setInterval(refresh, 5000);
"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

pub fn dashboard() -> String {
    let body = format!(
        r#"<header><strong>powerwatch</strong><span>updated <span id="lastUpdate">-</span> · <a href="/docs">API</a> · <a href="/logout">log out</a></span></header>
<main>
<div id="alertBanner"></div>
<div class="cards">
  <div class="card">Records<div class="value" id="totalRecords">-</div></div>
  <div class="card">Anomalies<div class="value" id="totalAnomalies">-</div></div>
  <div class="card">Avg power (kW)<div class="value" id="avgPower">-</div></div>
  <div class="card">Avg voltage (V)<div class="value" id="avgVoltage">-</div></div>
</div>
<h3>Recent anomalies (<span id="anomalyCount">0</span>)</h3>
<table><thead><tr><th>Timestamp</th><th>Power</th><th>Voltage</th><th>Score</th><th>Detected</th></tr></thead><tbody id="anomalies"></tbody></table>
<h3>Latest readings</h3>
<table><thead><tr><th>Timestamp</th><th>Power</th><th>Voltage</th><th>Intensity</th><th>Score</th></tr></thead><tbody id="readings"></tbody></table>
</main>
<script>{SCRIPT}</script>"#
    );
    layout("powerwatch dashboard", &body)
}

pub fn login(error: Option<&str>) -> String {
    let error = error
        .map(|e| format!("<p class=\"error\">{}</p>", escape(e)))
        .unwrap_or_default();
    let body = format!(
        r#"<form class="login" method="post" action="/login">
<h2>powerwatch</h2>
{error}
<input name="username" placeholder="Username" autofocus required>
<input name="password" type="password" placeholder="Password" required>
<button type="submit">Log in</button>
</form>"#
    );
    layout("powerwatch login", &body)
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_shows_escaped_error() {
        let html = login(Some("bad <input>"));
        assert!(html.contains("bad &lt;input&gt;"));
        assert!(login(None).contains("action=\"/login\""));
        assert!(!login(None).contains("class=\"error\""));
    }

    #[test]
    fn dashboard_polls_api() {
        let html = dashboard();
        assert!(html.contains("/api/stats"));
        assert!(html.contains("/api/current_alert"));
    }
}
