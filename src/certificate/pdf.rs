//! Certificate PDF rendering
//!
//! Pure function from a certificate snapshot to a single-page landscape A4
//! PDF. Only the built-in Helvetica faces are referenced, so the output
//! needs no embedded font data and the whole document can be assembled as
//! one content stream plus a handwritten cross-reference table.

use crate::db::schemas::CertificateDoc;

// A4 landscape, in PDF points
const PAGE_WIDTH: f64 = 842.0;
const PAGE_HEIGHT: f64 = 595.0;

const INK_DARK: &str = "0.10 0.21 0.36";
const INK_BODY: &str = "0.18 0.22 0.28";
const INK_MUTED: &str = "0.29 0.33 0.41";
const INK_FAINT: &str = "0.44 0.50 0.59";

/// Render the certificate artifact.
///
/// No side effects; the same snapshot always produces the same layout
/// (timestamps inside the snapshot included).
pub fn render_certificate(certificate: &CertificateDoc) -> Vec<u8> {
    let content = content_stream(certificate);

    let objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH:.0} {PAGE_HEIGHT:.0}] \
             /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>"
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
    ];

    assemble(&objects)
}

fn content_stream(certificate: &CertificateDoc) -> String {
    let mut ops = String::new();

    // Double border
    ops.push_str(&format!("3 w {INK_DARK} RG 40 40 762 515 re S\n"));
    ops.push_str(&format!("1 w {INK_BODY} RG 50 50 742 495 re S\n"));

    ops.push_str(&centered("F1", 32.0, INK_DARK, 450.0, "CERTIFICATE OF COMPLETION"));

    // Rule under the title
    ops.push_str(&format!(
        "2 w {INK_MUTED} RG {:.1} 435 m {:.1} 435 l S\n",
        PAGE_WIDTH / 2.0 - 100.0,
        PAGE_WIDTH / 2.0 + 100.0
    ));

    ops.push_str(&centered("F2", 18.0, INK_BODY, 390.0, "This is to certify that"));
    ops.push_str(&centered(
        "F1",
        28.0,
        INK_DARK,
        348.0,
        &certificate.student_name.to_uppercase(),
    ));
    ops.push_str(&centered(
        "F2",
        18.0,
        INK_BODY,
        308.0,
        "has successfully completed the course",
    ));
    ops.push_str(&centered(
        "F1",
        24.0,
        INK_DARK,
        266.0,
        &format!("\"{}\"", certificate.course_title),
    ));

    let hours = (certificate.total_course_duration / 60.0 * 10.0).round() / 10.0;
    ops.push_str(&centered(
        "F2",
        14.0,
        INK_FAINT,
        220.0,
        &format!("Course Duration: {hours} hours"),
    ));

    let completion = certificate
        .completion_date
        .to_chrono()
        .format("%B %d, %Y")
        .to_string();
    ops.push_str(&text_at(
        "F2",
        14.0,
        INK_BODY,
        70.0,
        160.0,
        &format!("Completion Date: {completion}"),
    ));
    let number_label = format!("Certificate No: {}", certificate.certificate_number);
    ops.push_str(&text_at(
        "F2",
        14.0,
        INK_BODY,
        772.0 - text_width(&number_label, 14.0),
        160.0,
        &number_label,
    ));

    ops.push_str(&centered(
        "F2",
        10.0,
        INK_FAINT,
        120.0,
        &format!("Verification Code: {}", certificate.verification_code),
    ));

    // Signature line
    ops.push_str(&format!(
        "1 w {INK_BODY} RG {:.1} 95 m {:.1} 95 l S\n",
        PAGE_WIDTH / 2.0 - 100.0,
        PAGE_WIDTH / 2.0 + 100.0
    ));
    ops.push_str(&centered("F2", 12.0, INK_BODY, 78.0, "Authorized Signature"));

    ops
}

/// Approximate width of Helvetica text (average glyph ~0.5 em)
fn text_width(text: &str, size: f64) -> f64 {
    text.chars().count() as f64 * size * 0.5
}

fn centered(font: &str, size: f64, color: &str, y: f64, text: &str) -> String {
    let x = (PAGE_WIDTH - text_width(text, size)) / 2.0;
    text_at(font, size, color, x.max(55.0), y, text)
}

fn text_at(font: &str, size: f64, color: &str, x: f64, y: f64, text: &str) -> String {
    format!(
        "BT /{font} {size:.0} Tf {color} rg {x:.1} {y:.1} Td ({}) Tj ET\n",
        escape_text(text)
    )
}

/// Escape PDF literal-string delimiters
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' | '\r' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

/// Serialize numbered objects with a cross-reference table and trailer
fn assemble(objects: &[String]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, body).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Metadata;

    fn certificate() -> CertificateDoc {
        CertificateDoc {
            _id: None,
            metadata: Metadata::new(),
            user_id: "u1".into(),
            course_id: "c1".into(),
            certificate_number: "CERT-202608-0001".into(),
            verification_code: "A1B2C3D4E5F60718".into(),
            student_name: "Ada Lovelace".into(),
            course_title: "Analytical Engines (Advanced)".into(),
            completion_date: bson::DateTime::now(),
            total_course_duration: 100.0,
            final_score: 100,
            certificate_url: None,
            is_valid: true,
            revoked_at: None,
            revocation_reason: None,
            issue_date: bson::DateTime::now(),
        }
    }

    #[test]
    fn test_renders_well_formed_pdf() {
        let pdf = render_certificate(&certificate());
        let text = String::from_utf8_lossy(&pdf);

        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("startxref"));
        assert!(text.contains("/Type /Catalog"));
    }

    #[test]
    fn test_contains_snapshot_fields() {
        let pdf = render_certificate(&certificate());
        let text = String::from_utf8_lossy(&pdf);

        assert!(text.contains("ADA LOVELACE"));
        assert!(text.contains("CERT-202608-0001"));
        assert!(text.contains("A1B2C3D4E5F60718"));
        // 100 minutes rounds to 1.7 hours
        assert!(text.contains("Course Duration: 1.7 hours"));
    }

    #[test]
    fn test_escapes_string_delimiters() {
        let pdf = render_certificate(&certificate());
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.contains("Analytical Engines \\(Advanced\\)"));
    }

    #[test]
    fn test_deterministic_for_same_snapshot() {
        let cert = certificate();
        assert_eq!(render_certificate(&cert), render_certificate(&cert));
    }
}
