use core::fmt::Write as _;

use crate::state::DeviceState;
use crate::storage::FormatOutcome;

const STYLE: &str = "\
body{font-family:Arial,sans-serif;max-width:720px;margin:2rem auto;padding:0 1rem;color:#111}\
h1{margin:0 0 .5rem}.muted{color:#555}.ok{color:#106010}.err{color:#a00000}\
.status{background:#e8f5e8;border:1px solid #4caf50;border-radius:4px;padding:10px;margin:10px 0}\
.warn{background:#fff5f5;border:1px solid #ffcccc;border-radius:4px;padding:10px;margin:10px 0}\
.files{max-height:300px;overflow-y:auto;border:1px solid #ddd;border-radius:4px;padding:10px}\
ul{list-style:none;padding:0}li{margin:4px 0;padding:6px;background:#f9f9f9;border-radius:4px}\
a.btn{display:inline-block;padding:8px 14px;margin:4px;border-radius:4px;color:#fff;text-decoration:none}\
.blue{background:#2196f3}.green{background:#4caf50}.red{background:#f44336}.orange{background:#ff9800}\
.danger{border:2px solid #ffcccc;border-radius:5px;background:#fff5f5;padding:12px;margin:20px 0}\
.danger h3{color:#d32f2f;margin-top:0}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title}</title>\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\
<style>{STYLE}</style></head><body>{body}</body></html>"
    )
}

fn back_link() -> &'static str {
    "<p><a href=\"/\">Back to control panel</a></p>"
}

pub fn index(state: &DeviceState, photos: &[String], total_size: u64) -> String {
    let mut body = String::from("<h1>Photostation</h1>");

    if state.mounted {
        body.push_str(
            "<div class=\"status\">&#128247; <strong>Camera active</strong> \
             &mdash; press the shutter button or trigger a capture below.</div>",
        );
    } else {
        body.push_str(
            "<div class=\"warn\"><strong>Storage not mounted.</strong> \
             Capture is disabled until the card is attached and the device rebooted.</div>",
        );
    }

    body.push_str("<a class=\"btn blue\" href=\"/\">Refresh</a>");
    body.push_str("<a class=\"btn green\" href=\"/takePhoto\">Take photo</a>");
    body.push_str("<a class=\"btn blue\" href=\"/sync\">Sync storage</a>");

    let _ = write!(
        &mut body,
        "<p class=\"muted\">{} photos on storage ({} KiB), next sequence {:04}</p>",
        photos.len(),
        total_size / 1024,
        state.sequence
    );

    body.push_str("<div class=\"files\"><h3>Photo files</h3><ul>");
    for name in photos {
        let _ = write!(&mut body, "<li>{name}</li>");
    }
    body.push_str("</ul></div>");

    body.push_str("<div class=\"danger\"><h3>&#9888; Danger zone</h3>");
    if !photos.is_empty() {
        let _ = write!(
            &mut body,
            "<a class=\"btn red\" href=\"/deleteAll\" \
             onclick=\"return confirm('Delete all {} photos?')\">Delete all photos</a>",
            photos.len()
        );
    }
    body.push_str(
        "<a class=\"btn red\" href=\"/format\" \
         onclick=\"return confirm('Format wipes the entire volume. Continue?')\">Format volume</a>\
         <a class=\"btn orange\" href=\"/reboot\" \
         onclick=\"return confirm('Reboot the camera system?')\">Reboot</a></div>",
    );

    body.push_str(
        "<p class=\"muted\"><strong>Usage:</strong> the physical shutter button takes photos; \
         remove the card to transfer files; refresh to update the list.</p>",
    );

    page("Photostation", &body)
}

pub fn capture_scheduled() -> String {
    page(
        "Capture",
        &format!(
            "<h1>Capture scheduled</h1>\
             <p>The photo is taken right after this response; give it a moment, \
             then refresh the file list.</p>{}",
            back_link()
        ),
    )
}

pub fn delete_result(deleted: usize, errors: usize) -> String {
    let detail = if errors > 0 {
        format!(" <span class=\"err\">({errors} files could not be removed)</span>")
    } else {
        String::new()
    };
    page(
        "Delete",
        &format!(
            "<h1>Deleted {deleted} photos</h1>\
             <p>The sequence counter was reset to 0.{detail}</p>{}",
            back_link()
        ),
    )
}

pub fn format_result(outcome: &FormatOutcome) -> String {
    if outcome.success {
        page(
            "Format",
            &format!(
                "<h1>Volume formatted</h1>\
                 <p class=\"ok\">Removed {} entries ({} errors); folder layout recreated \
                 and sequence counter reset.</p>{}",
                outcome.deleted,
                outcome.errors,
                back_link()
            ),
        )
    } else {
        page(
            "Format",
            &format!(
                "<h1>Format failed</h1>\
                 <p class=\"err\">Removed {} entries ({} errors) but the folder layout could \
                 not be recreated. Capture is disabled.</p>{}",
                outcome.deleted,
                outcome.errors,
                back_link()
            ),
        )
    }
}

pub fn sync_result(ok: bool) -> String {
    let body = if ok {
        format!(
            "<h1>Storage synced</h1><p class=\"ok\">All buffered writes flushed.</p>{}",
            back_link()
        )
    } else {
        format!(
            "<h1>Sync failed</h1><p class=\"err\">Neither the flush primitive nor the \
             fallback probe write succeeded.</p>{}",
            back_link()
        )
    };
    page("Sync", &body)
}

pub fn rebooting() -> String {
    page(
        "Reboot",
        "<h1>Rebooting...</h1>\
         <p>The camera system is restarting. This page will reload in 10 seconds.</p>\
         <script>setTimeout(function(){location.href='/';},10000);</script>",
    )
}

pub fn not_found() -> String {
    page(
        "Not found",
        &format!("<h1>404 Not Found</h1>{}", back_link()),
    )
}
