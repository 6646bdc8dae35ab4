use std::fmt;

/// Largest reply accepted from a server, all continuation lines included.
pub const MAX_REPLY_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// Every line must carry the same three digit code.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut code = None;
        let mut lines = Vec::new();

        for line in raw.lines().filter(|l| !l.is_empty()) {
            let digits = line
                .get(..3)
                .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
                .ok_or_else(|| format!("malformed reply line '{line}'"))?;
            let line_code: u16 = digits
                .parse()
                .map_err(|_| format!("malformed reply line '{line}'"))?;

            match code {
                None => code = Some(line_code),
                Some(c) if c != line_code => {
                    return Err(format!("reply code changed from {c} to {line_code}"));
                }
                Some(_) => {}
            }

            lines.push(line.get(4..).unwrap_or_default().to_string());
        }

        code.map(|code| Self { code, lines })
            .ok_or_else(|| "empty reply".to_string())
    }

    pub fn is_last_line(line: &str) -> bool {
        line.as_bytes().get(3) != Some(&b'-')
    }

    pub const fn is_error(&self) -> bool {
        self.code >= 400
    }

    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}
