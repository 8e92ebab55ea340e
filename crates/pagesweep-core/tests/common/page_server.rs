//! Minimal HTTP/1.1 server that serves paginated HTML listing pages for
//! integration tests.
//!
//! `GET /list?page=N&key=K` answers with page N of the configured collection
//! (an empty table once the pages run out). Pages listed in `fail_pages`
//! answer 500.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Default)]
pub struct PageServerOptions {
    /// Rows per page, page 1 first.
    pub rows_per_page: Vec<usize>,
    pub fail_pages: HashSet<u32>,
}

pub struct PageServer {
    /// URL template with `{page}` and `{key}` placeholders.
    pub url_template: String,
    requests: Arc<AtomicUsize>,
}

impl PageServer {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. The server runs until the process exits.
pub fn start(opts: PageServerOptions) -> PageServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let opts = Arc::new(opts);
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let opts = Arc::clone(&opts);
            let counter = Arc::clone(&counter);
            thread::spawn(move || handle(stream, &opts, &counter));
        }
    });
    PageServer {
        url_template: format!("http://127.0.0.1:{}/list?page={{page}}&key={{key}}", port),
        requests,
    }
}

fn handle(mut stream: std::net::TcpStream, opts: &PageServerOptions, counter: &AtomicUsize) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    counter.fetch_add(1, Ordering::SeqCst);
    let Some((page, key)) = parse_request(request) else {
        let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n");
        return;
    };
    if opts.fail_pages.contains(&page) {
        let _ = stream.write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    let rows = opts
        .rows_per_page
        .get(page.saturating_sub(1) as usize)
        .copied()
        .unwrap_or(0);
    let body = render_page(&key, page, rows);
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body.as_bytes());
}

/// Row names are `<key> hospital <page>.<row>`.
pub fn row_name(key: &str, page: u32, row: usize) -> String {
    format!("{} hospital {}.{}", key, page, row)
}

fn render_page(key: &str, page: u32, rows: usize) -> String {
    let mut html = String::from(
        "<html><body><div class=\"table-benhvien\"><table><tbody>",
    );
    for row in 0..rows {
        html.push_str(&format!(
            "<tr><td class=\"text-center\">{ord}</td>\
             <td><span class=\"date\">01/01/2024</span></td>\
             <td><img src=\"/logo/{page}-{row}.png\"></td>\
             <td><h3 class=\"name\">{name}</h3></td>\
             <td><a class=\"website\" href=\"https://h{page}-{row}.test\">site</a></td>\
             <td></td></tr>",
            ord = row + 1,
            page = page,
            row = row,
            name = row_name(key, page, row),
        ));
    }
    html.push_str("</tbody></table></div></body></html>");
    html
}

/// Returns (page, key) from `GET /list?page=N&key=K HTTP/1.1`.
fn parse_request(request: &str) -> Option<(u32, String)> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.eq_ignore_ascii_case("GET") {
        return None;
    }
    let target = parts.next()?;
    let query = target.split_once('?')?.1;
    let mut page = None;
    let mut key = None;
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match name.as_ref() {
            "page" => page = value.parse::<u32>().ok(),
            "key" => key = Some(value.into_owned()),
            _ => {}
        }
    }
    Some((page?, key?))
}
