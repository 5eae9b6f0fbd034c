//! Branded HTML page served in place of every backend or proxy failure

use crate::config::Brand;
use chrono::{DateTime, SecondsFormat, Utc};
use hyper::StatusCode;

fn title_for(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "Bad Request",
        404 => "Link Not Found",
        413 => "Request Too Large",
        500 => "Server Error",
        502 => "Backend Unavailable",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// Escape text for HTML element and attribute content
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the page. `host` and `path` come straight from the client and are escaped.
pub fn render(
    brand: &Brand,
    host: &str,
    path: &str,
    status: StatusCode,
    now: DateTime<Utc>,
) -> String {
    let title = title_for(status);
    let reason = if status == StatusCode::NOT_FOUND {
        "doesn't exist or has expired"
    } else {
        "encountered an error"
    };
    let brand_name = escape_html(&brand.name);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <meta name="robots" content="noindex">
  <title>{title} - {brand_name}</title>
  <style>
    * {{ margin: 0; padding: 0; box-sizing: border-box; }}
    body {{
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
      background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
      color: white; min-height: 100vh; display: flex;
      align-items: center; justify-content: center; padding: 20px;
    }}
    .container {{
      background: rgba(255,255,255,0.1); padding: 40px; border-radius: 20px;
      border: 1px solid rgba(255,255,255,0.2); text-align: center;
      max-width: 500px; width: 100%;
    }}
    h1 {{ font-size: 32px; margin-bottom: 16px; font-weight: 600; }}
    p {{ margin: 12px 0; opacity: 0.9; line-height: 1.5; }}
    .details {{
      background: rgba(0,0,0,0.2); padding: 16px; border-radius: 8px; margin: 20px 0;
      font-family: 'Monaco', 'Menlo', monospace; font-size: 14px; text-align: left;
      word-break: break-all;
    }}
    .btn {{
      display: inline-block; color: #4ecdc4; text-decoration: none; font-weight: 600;
      padding: 14px 28px; background: rgba(78, 205, 196, 0.2); border-radius: 8px;
      margin-top: 20px; border: 1px solid rgba(78, 205, 196, 0.3);
    }}
    .footer {{ margin-top: 30px; opacity: 0.7; font-size: 14px; }}
  </style>
</head>
<body>
  <div class="container">
    <h1>{title}</h1>
    <p>The short link you're looking for {reason}.</p>
    <div class="details">
      <div><strong>Domain:</strong> {host}</div>
      <div><strong>Path:</strong> {path}</div>
      <div><strong>Status:</strong> {code}</div>
      <div><strong>Time:</strong> {time}</div>
    </div>
    <a href="{home}" class="btn">Create Your Own Short Links</a>
    <div class="footer">Powered by <strong>{brand_name}</strong></div>
  </div>
</body>
</html>
"#,
        title = title,
        brand_name = brand_name,
        reason = reason,
        host = escape_html(host),
        path = escape_html(path),
        code = status.as_u16(),
        time = now.to_rfc3339_opts(SecondsFormat::Millis, true),
        home = escape_html(&brand.home_url),
    )
}
