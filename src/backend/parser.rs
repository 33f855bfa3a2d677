//! 后端输出解析函数

/// 清理终端输出中的 ANSI 转义序列和控制字符
pub fn clean_terminal_output(input: &str) -> String {
    let mut result = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            c if c.is_control() && c != '\t' => {}
            _ => result.push(c),
        }
    }

    result
}

/// 一行输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// 以 `\n` 结束的普通日志行
    Log(String),
    /// 以 `\r` 结束、就地刷新的进度行
    Progress(String),
}

/// 把字节流切分为日志行与进度行
///
/// 按字节缓冲，整行凑齐后才解码，跨读取边界的多字节字符不会被拆坏。
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        for &b in chunk {
            match b {
                b'\n' => self.take(&mut lines, OutputLine::Log),
                b'\r' => self.take(&mut lines, OutputLine::Progress),
                _ => self.buffer.push(b),
            }
        }
        lines
    }

    /// 流结束时取出残留的最后一行
    pub fn finish(mut self) -> Option<OutputLine> {
        let mut lines = Vec::new();
        self.take(&mut lines, OutputLine::Log);
        lines.pop()
    }

    fn take(&mut self, lines: &mut Vec<OutputLine>, kind: fn(String) -> OutputLine) {
        let cleaned = clean_terminal_output(&String::from_utf8_lossy(&self.buffer));
        self.buffer.clear();
        if !cleaned.trim().is_empty() {
            lines.push(kind(cleaned));
        }
    }
}
