//! Inline HTML pages
//!
//! Small, dependency-free pages meant for phones held next to a case.

use lims_core::{CaseRef, CaseState, Employee, Event};
use std::fmt::Write as _;

/// Escape text for HTML bodies and attribute values
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"es\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape(title),
    )
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:1.5rem;max-width:60rem}\
table{border-collapse:collapse;width:100%}td,th{border:1px solid #ccc;padding:.35rem;text-align:left}\
.ok{color:#12723a}.warn{color:#a15c00}.qr{width:140px;height:140px}\
.card{display:inline-block;margin:.75rem;text-align:center}pre{white-space:pre-wrap}";

/// Dashboard: case creation form, case table and log tail
#[must_use]
pub fn dashboard() -> String {
    layout("LIMS", DASHBOARD_BODY)
}

const DASHBOARD_BODY: &str = r#"<h1>Casos</h1>
<form id="new-case" enctype="multipart/form-data">
  <label>Paciente <input name="paciente" required></label>
  <label>Notas <textarea name="notas"></textarea></label>
  <input type="file" name="archivos" multiple>
  <button type="submit">Crear caso</button>
  <span id="status"></span>
</form>
<p><a href="/local_auto_qr">QR de empleados</a></p>
<table>
  <thead><tr><th>QR</th><th>Caso</th><th>Fase</th><th>Eventos</th><th>Modificado</th><th></th></tr></thead>
  <tbody id="cases"></tbody>
</table>
<h2>Log</h2>
<pre id="logs"></pre>
<script>
const esc = s => String(s).replace(/[&<>"']/g, c => ({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}[c]));
async function refresh() {
  const data = await (await fetch('/cases')).json();
  document.getElementById('cases').innerHTML = data.cases.map(c => `<tr>
    <td>${c.qr_url ? `<img class="qr" src="${esc(c.qr_url)}">` : ''}</td>
    <td>${esc(c.name)}</td><td>${esc(c.phase)}</td><td>${c.events_count}</td><td>${esc(c.mtime)}</td>
    <td><a href="/print_order/${encodeURIComponent(c.name)}">Imprimir</a>
        <button data-name="${esc(c.name)}" onclick="removeCase(this.dataset.name)">Borrar</button></td></tr>`).join('');
  const logs = await (await fetch('/logs')).json();
  document.getElementById('logs').textContent = logs.lines.join('\n');
}
async function removeCase(name) {
  if (!confirm('Borrar ' + name + '?')) return;
  await fetch('/case/' + encodeURIComponent(name), {method: 'DELETE'});
  refresh();
}
document.getElementById('new-case').addEventListener('submit', async ev => {
  ev.preventDefault();
  const res = await (await fetch('/new_case', {method: 'POST', body: new FormData(ev.target)})).json();
  document.getElementById('status').textContent = res.ok ? 'Creado' : res.msg;
  if (res.ok) ev.target.reset();
  refresh();
});
refresh();
</script>"#;

/// Greeting after a device is identified
#[must_use]
pub fn scan_ready(employee: &Employee) -> String {
    layout(
        "Listo para escanear",
        &format!(
            "<h1 class=\"ok\">Hola, {}</h1>\n<p>Este dispositivo queda identificado. \
             Escanea el QR de un caso para registrar tu avance.</p>",
            escape(&employee.name)
        ),
    )
}

/// Shown when a case is scanned from an unidentified device
#[must_use]
pub fn identify_first(case: &CaseRef) -> String {
    layout(
        "Identifícate",
        &format!(
            "<h1 class=\"warn\">Identifícate primero</h1>\n\
             <p>No se registró nada en <b>{}</b>. Escanea tu QR de empleado y vuelve a \
             escanear el caso.</p>\n<p><a href=\"/local_auto_qr\">QR de empleados</a></p>",
            escape(&case.name)
        ),
    )
}

/// Confirmation of a recorded event
#[must_use]
pub fn recorded(case: &CaseRef, event: &Event) -> String {
    layout(
        "Registrado",
        &format!(
            "<h1 class=\"ok\">Registrado</h1>\n<table>\n\
             <tr><th>Caso</th><td>{}</td></tr>\n<tr><th>Fase</th><td>{}</td></tr>\n\
             <tr><th>Trabajador</th><td>{}</td></tr>\n<tr><th>Hora</th><td>{}</td></tr>\n</table>",
            escape(&case.name),
            escape(&event.phase),
            escape(&event.worker),
            escape(&event.ts),
        ),
    )
}

/// Every employee QR with its PIN
#[must_use]
pub fn employee_qrs<'a>(employees: impl IntoIterator<Item = &'a Employee>, qr_prefix: &str) -> String {
    let mut body = String::from("<h1>QR de empleados</h1>\n");
    for employee in employees {
        let _ = writeln!(
            body,
            "<div class=\"card\"><img class=\"qr\" src=\"{prefix}/employees/{id}.svg\" alt=\"{id}\">\
             <div><b>{name}</b></div><div>PIN {pin}</div></div>",
            prefix = qr_prefix,
            id = escape(&employee.id),
            name = escape(&employee.name),
            pin = escape(employee.pin()),
        );
    }
    layout("QR de empleados", &body)
}

/// Printable work order
#[must_use]
pub fn print_order(case: &CaseRef, state: &CaseState, instructions: &str, qr_url: &str) -> String {
    let mut rows = String::new();
    for event in &state.events {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&event.ts),
            escape(&event.phase),
            escape(&event.worker),
            escape(&event.note),
        );
    }
    let qr = if qr_url.is_empty() {
        String::new()
    } else {
        format!("<img class=\"qr\" src=\"{}\" alt=\"QR\">", escape(qr_url))
    };
    layout(
        &format!("Orden {}", case.name),
        &format!(
            "<h1>Orden de trabajo: {name}</h1>\n{qr}\n<p>Fase actual: <b>{phase}</b></p>\n\
             <pre>{instructions}</pre>\n<table>\n<thead><tr><th>Hora</th><th>Fase</th>\
             <th>Trabajador</th><th>Nota</th></tr></thead>\n<tbody>\n{rows}</tbody>\n</table>\n\
             <script>window.onload = () => window.print();</script>",
            name = escape(&case.name),
            phase = escape(state.phase()),
            instructions = escape(instructions),
        ),
    )
}

/// Minimal error page for HTML routes
#[must_use]
pub fn error(message: &str) -> String {
    layout("Error", &format!("<h1 class=\"warn\">{}</h1>", escape(message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_markup() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn employee_page_lists_pins() {
        let employees = [Employee::new("carlos", "Carlos Ortiz", "6026218249").unwrap()];
        let html = employee_qrs(employees.iter(), "/static/qrs");
        assert!(html.contains("/static/qrs/employees/carlos.svg"));
        assert!(html.contains("PIN 8249"));
    }
}
