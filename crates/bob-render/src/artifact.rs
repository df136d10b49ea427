use serde::Serialize;

const MARKER: &str = "---";

/// Output of a render: the full text plus its header and body regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedArtifact {
  pub text: String,
  /// Text between the opening and closing `---` lines, without the markers.
  pub header: Option<String>,
  pub body: String,
}

impl RenderedArtifact {
  /// Split rendered text into header and body.
  ///
  /// A header exists only when the first line is exactly `---` and a later
  /// line is exactly `---`. Otherwise the whole text is the body.
  pub fn split(text: String) -> Self {
    let lines: Vec<&str> = text.split('\n').collect();

    let closing = match lines.first() {
      Some(&first) if first == MARKER => lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| **line == MARKER)
        .map(|(i, _)| i),
      _ => None,
    };

    let Some(end) = closing else {
      return Self {
        body: text.clone(),
        header: None,
        text,
      };
    };

    let header = lines[1..end].join("\n");
    let body = lines[end + 1..].join("\n");

    Self {
      text,
      header: Some(header),
      body,
    }
  }

  /// 1-based line of `text` where the header content starts.
  pub fn header_first_line(&self) -> Option<usize> {
    self.header.as_ref().map(|_| 2)
  }
}
