//! Plain-text terminal screen model.
//!
//! [`Screen`] keeps a `rows × cols` grid of characters updated from the raw
//! output stream: printable text, line feed/carriage return, cursor movement,
//! erasing, scroll regions and the alternate screen. Colors and other
//! attributes are parsed and dropped.
//!
//! Every row that scrolls off the top of the primary screen is handed to a
//! [`ScrollbackObserver`] as finalized text: blank cells become spaces,
//! trailing spaces are stripped and a newline is appended.

use std::io;
use std::mem;
use vte::{Params, Parser, Perform};

/// Value of a cell that was never written.
pub const BLANK: char = '\0';

const TAB_WIDTH: usize = 8;

/// Receives rows evicted from the top of the screen, oldest first.
pub trait ScrollbackObserver {
    fn row_evicted(&mut self, row: &[u8]) -> io::Result<()>;
}

/// Turn a row of cells into settled transcript text.
pub fn finalize_row(cells: &[char]) -> Vec<u8> {
    let mut text: String = cells
        .iter()
        .map(|&c| if c == BLANK { ' ' } else { c })
        .collect();
    let len = text.trim_end_matches(' ').len();
    text.truncate(len);
    text.push('\n');
    text.into_bytes()
}

/// A terminal screen fed from raw output bytes.
pub struct Screen {
    parser: Parser,
    grid: Grid,
}

impl Screen {
    pub fn new(rows: usize, cols: usize) -> Self {
        Screen {
            parser: Parser::new(),
            grid: Grid::new(rows.max(1), cols.max(1)),
        }
    }

    pub fn rows(&self) -> usize {
        self.grid.rows
    }

    pub fn cols(&self) -> usize {
        self.grid.cols
    }

    /// Cursor position as `(row, col)`.
    pub fn cursor(&self) -> (usize, usize) {
        (self.grid.row, self.grid.col)
    }

    /// Feed raw output, reporting evicted rows to `observer` in order.
    pub fn feed(&mut self, data: &[u8], observer: &mut dyn ScrollbackObserver) -> io::Result<()> {
        for &byte in data {
            self.parser.advance(&mut self.grid, byte);
        }
        self.grid.flush_evicted(observer)
    }

    /// The whole visible screen, one finalized row per line.
    pub fn snapshot(&self) -> Vec<u8> {
        self.grid
            .cells
            .iter()
            .flat_map(|row| finalize_row(row))
            .collect()
    }

    /// Change the screen size. Rows that no longer fit above the cursor are
    /// evicted to `observer`.
    pub fn resize(
        &mut self,
        rows: usize,
        cols: usize,
        observer: &mut dyn ScrollbackObserver,
    ) -> io::Result<()> {
        self.grid.resize(rows.max(1), cols.max(1));
        self.grid.flush_evicted(observer)
    }

    /// Forget everything currently displayed without evicting it.
    ///
    /// The cursor moves to the top row and keeps its column, so output that
    /// continues the current line lands where it would have.
    pub fn clear(&mut self) {
        for row in &mut self.grid.cells {
            row.fill(BLANK);
        }
        self.grid.row = 0;
        self.grid.wrap_pending = false;
    }
}

struct SavedScreen {
    cells: Vec<Vec<char>>,
    row: usize,
    col: usize,
}

struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Vec<char>>,
    row: usize,
    col: usize,
    wrap_pending: bool,
    autowrap: bool,
    top: usize,
    bottom: usize,
    saved_cursor: Option<(usize, usize)>,
    /// The primary screen while the alternate screen is shown.
    primary: Option<SavedScreen>,
    evicted: Vec<Vec<char>>,
}

impl Grid {
    fn new(rows: usize, cols: usize) -> Self {
        Grid {
            rows,
            cols,
            cells: vec![vec![BLANK; cols]; rows],
            row: 0,
            col: 0,
            wrap_pending: false,
            autowrap: true,
            top: 0,
            bottom: rows - 1,
            saved_cursor: None,
            primary: None,
            evicted: Vec::new(),
        }
    }

    fn blank_row(&self) -> Vec<char> {
        vec![BLANK; self.cols]
    }

    fn flush_evicted(&mut self, observer: &mut dyn ScrollbackObserver) -> io::Result<()> {
        for row in self.evicted.drain(..) {
            observer.row_evicted(&finalize_row(&row))?;
        }
        Ok(())
    }

    fn scroll_up(&mut self, n: usize) {
        let n = n.min(self.bottom - self.top + 1);
        for _ in 0..n {
            let row = self.cells.remove(self.top);
            if self.top == 0 && self.primary.is_none() {
                self.evicted.push(row);
            }
            let blank = self.blank_row();
            self.cells.insert(self.bottom, blank);
        }
    }

    fn scroll_down(&mut self, n: usize) {
        let n = n.min(self.bottom - self.top + 1);
        for _ in 0..n {
            self.cells.remove(self.bottom);
            let blank = self.blank_row();
            self.cells.insert(self.top, blank);
        }
    }

    fn linefeed(&mut self) {
        self.wrap_pending = false;
        if self.row == self.bottom {
            self.scroll_up(1);
        } else if self.row + 1 < self.rows {
            self.row += 1;
        }
    }

    fn reverse_index(&mut self) {
        self.wrap_pending = false;
        if self.row == self.top {
            self.scroll_down(1);
        } else if self.row > 0 {
            self.row -= 1;
        }
    }

    fn put_char(&mut self, c: char) {
        if self.wrap_pending {
            self.col = 0;
            self.linefeed();
        }
        self.cells[self.row][self.col] = c;
        if self.col + 1 < self.cols {
            self.col += 1;
        } else if self.autowrap {
            self.wrap_pending = true;
        }
    }

    fn goto(&mut self, row: usize, col: usize) {
        self.row = row.min(self.rows - 1);
        self.col = col.min(self.cols - 1);
        self.wrap_pending = false;
    }

    fn erase_in_line(&mut self, mode: u16) {
        let (start, end) = match mode {
            0 => (self.col, self.cols),
            1 => (0, self.col + 1),
            2 => (0, self.cols),
            _ => return,
        };
        self.cells[self.row][start..end].fill(BLANK);
    }

    fn erase_in_display(&mut self, mode: u16) {
        match mode {
            0 => {
                self.erase_in_line(0);
                for row in &mut self.cells[self.row + 1..] {
                    row.fill(BLANK);
                }
            }
            1 => {
                for row in &mut self.cells[..self.row] {
                    row.fill(BLANK);
                }
                self.erase_in_line(1);
            }
            2 => {
                for row in &mut self.cells {
                    row.fill(BLANK);
                }
            }
            // 3 clears the host's scrollback, which is not kept here.
            _ => {}
        }
    }

    fn insert_lines(&mut self, n: usize) {
        if self.row < self.top || self.row > self.bottom {
            return;
        }
        for _ in 0..n.min(self.bottom - self.row + 1) {
            self.cells.remove(self.bottom);
            let blank = self.blank_row();
            self.cells.insert(self.row, blank);
        }
        self.col = 0;
    }

    fn delete_lines(&mut self, n: usize) {
        if self.row < self.top || self.row > self.bottom {
            return;
        }
        for _ in 0..n.min(self.bottom - self.row + 1) {
            self.cells.remove(self.row);
            let blank = self.blank_row();
            self.cells.insert(self.bottom, blank);
        }
        self.col = 0;
    }

    fn insert_chars(&mut self, n: usize) {
        let (col, cols) = (self.col, self.cols);
        let line = &mut self.cells[self.row];
        for _ in 0..n.min(cols - col) {
            line.insert(col, BLANK);
        }
        line.truncate(cols);
    }

    fn delete_chars(&mut self, n: usize) {
        let (col, cols) = (self.col, self.cols);
        let line = &mut self.cells[self.row];
        for _ in 0..n.min(cols - col) {
            line.remove(col);
            line.push(BLANK);
        }
    }

    fn erase_chars(&mut self, n: usize) {
        let end = (self.col + n).min(self.cols);
        self.cells[self.row][self.col..end].fill(BLANK);
    }

    fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let bottom = bottom.min(self.rows);
        if top < bottom {
            self.top = top - 1;
            self.bottom = bottom - 1;
            self.goto(0, 0);
        }
    }

    fn enter_alternate_screen(&mut self) {
        if self.primary.is_some() {
            return;
        }
        let blank = vec![self.blank_row(); self.rows];
        self.primary = Some(SavedScreen {
            cells: mem::replace(&mut self.cells, blank),
            row: self.row,
            col: self.col,
        });
    }

    fn leave_alternate_screen(&mut self) {
        if let Some(saved) = self.primary.take() {
            self.cells = saved.cells;
            self.goto(saved.row, saved.col);
        }
    }

    fn reset(&mut self) {
        let (rows, cols) = (self.rows, self.cols);
        let evicted = mem::take(&mut self.evicted);
        *self = Grid::new(rows, cols);
        self.evicted = evicted;
    }

    fn resize(&mut self, rows: usize, cols: usize) {
        if cols != self.cols {
            for line in &mut self.cells {
                line.resize(cols, BLANK);
            }
            if let Some(saved) = &mut self.primary {
                for line in &mut saved.cells {
                    line.resize(cols, BLANK);
                }
            }
            self.cols = cols;
        }

        if rows < self.rows {
            let mut excess = self.rows - rows;
            // Blank rows below the cursor go first, then rows off the top.
            while excess > 0
                && self.cells.len() - 1 > self.row
                && self
                    .cells
                    .last()
                    .is_some_and(|line| line.iter().all(|&c| c == BLANK || c == ' '))
            {
                self.cells.pop();
                excess -= 1;
            }
            for _ in 0..excess {
                let line = self.cells.remove(0);
                if self.primary.is_none() {
                    self.evicted.push(line);
                }
                self.row = self.row.saturating_sub(1);
            }
        } else {
            let blank = self.blank_row();
            self.cells.resize(rows, blank);
        }

        if let Some(saved) = &mut self.primary {
            saved.cells.resize(rows, vec![BLANK; cols]);
            saved.row = saved.row.min(rows - 1);
            saved.col = saved.col.min(cols - 1);
        }

        self.rows = rows;
        self.top = 0;
        self.bottom = rows - 1;
        let (row, col) = (self.row, self.col);
        self.goto(row, col);
    }

    fn set_private_mode(&mut self, mode: u16, enabled: bool) {
        match mode {
            7 => self.autowrap = enabled,
            47 | 1047 | 1049 if enabled => self.enter_alternate_screen(),
            47 | 1047 | 1049 => self.leave_alternate_screen(),
            _ => {}
        }
    }
}

/// First value of the `idx`th parameter, or `default` when absent or zero.
fn param(params: &Params, idx: usize, default: usize) -> usize {
    params
        .iter()
        .nth(idx)
        .and_then(|p| p.first().copied())
        .filter(|&v| v != 0)
        .map_or(default, usize::from)
}

fn mode(params: &Params) -> u16 {
    params
        .iter()
        .next()
        .and_then(|p| p.first().copied())
        .unwrap_or(0)
}

impl Perform for Grid {
    fn print(&mut self, c: char) {
        self.put_char(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x08 => {
                self.col = self.col.saturating_sub(1);
                self.wrap_pending = false;
            }
            b'\t' => {
                let next = (self.col / TAB_WIDTH + 1) * TAB_WIDTH;
                self.col = next.min(self.cols - 1);
                self.wrap_pending = false;
            }
            b'\n' | 0x0b | 0x0c => self.linefeed(),
            b'\r' => {
                self.col = 0;
                self.wrap_pending = false;
            }
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            return;
        }
        if intermediates == b"?" {
            if action == 'h' || action == 'l' {
                for p in params.iter() {
                    self.set_private_mode(p.first().copied().unwrap_or(0), action == 'h');
                }
            }
            return;
        }
        if !intermediates.is_empty() {
            return;
        }

        let (row, col) = (self.row, self.col);
        match action {
            'A' => self.goto(row.saturating_sub(param(params, 0, 1)), col),
            'B' | 'e' => self.goto(row + param(params, 0, 1), col),
            'C' | 'a' => self.goto(row, col + param(params, 0, 1)),
            'D' => self.goto(row, col.saturating_sub(param(params, 0, 1))),
            'E' => self.goto(row + param(params, 0, 1), 0),
            'F' => self.goto(row.saturating_sub(param(params, 0, 1)), 0),
            'G' | '`' => self.goto(row, param(params, 0, 1) - 1),
            'H' | 'f' => self.goto(param(params, 0, 1) - 1, param(params, 1, 1) - 1),
            'd' => self.goto(param(params, 0, 1) - 1, col),
            'J' => self.erase_in_display(mode(params)),
            'K' => self.erase_in_line(mode(params)),
            'L' => self.insert_lines(param(params, 0, 1)),
            'M' => self.delete_lines(param(params, 0, 1)),
            '@' => self.insert_chars(param(params, 0, 1)),
            'P' => self.delete_chars(param(params, 0, 1)),
            'X' => self.erase_chars(param(params, 0, 1)),
            'S' => self.scroll_up(param(params, 0, 1)),
            'T' => self.scroll_down(param(params, 0, 1)),
            'r' => {
                let rows = self.rows;
                self.set_scroll_region(param(params, 0, 1), param(params, 1, rows));
            }
            's' => self.saved_cursor = Some((row, col)),
            'u' => {
                if let Some((r, c)) = self.saved_cursor {
                    self.goto(r, c);
                }
            }
            _ => {}
        }
        if !matches!(action, 'm' | 'n' | 'c' | 'q') {
            self.wrap_pending = false;
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        if ignore || !intermediates.is_empty() {
            return;
        }
        match byte {
            b'D' => self.linefeed(),
            b'E' => {
                self.col = 0;
                self.linefeed();
            }
            b'M' => self.reverse_index(),
            b'7' => self.saved_cursor = Some((self.row, self.col)),
            b'8' => {
                if let Some((r, c)) = self.saved_cursor {
                    self.goto(r, c);
                }
            }
            b'c' => self.reset(),
            _ => {}
        }
    }
}
