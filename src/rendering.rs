use core::fmt;

use heapless::String;
use ufmt::uwrite;

use crate::clock::DateTimeComponents;
use crate::sinks::{PartialSink, SinkDeliveryError};
use crate::telemetry::Fields;

pub const COLUMNS: u8 = 16;
pub const ROWS: u8 = 2;

/// Fixed labels, drawn once. Values are written into the blanks.
pub const TEMPLATE: [&str; ROWS as usize] = ["  :   H  % T:  C", "P2.5:    P10:   "];

/// A value cell on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub col: u8,
    pub row: u8,
    pub width: u8,
}

pub const HOUR: Cell = Cell { col: 0, row: 0, width: 2 };
pub const MINUTE: Cell = Cell { col: 3, row: 0, width: 2 };
pub const HUMIDITY: Cell = Cell { col: 7, row: 0, width: 2 };
pub const TEMPERATURE: Cell = Cell { col: 13, row: 0, width: 2 };
pub const PM25: Cell = Cell { col: 5, row: 1, width: 3 };
pub const PM10: Cell = Cell { col: 13, row: 1, width: 3 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayError;

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("display write failed")
    }
}

/// The character-cell operations the station needs from an LCD
pub trait CharacterDisplay {
    fn clear(&mut self) -> Result<(), DisplayError>;
    fn write_at(&mut self, col: u8, row: u8, text: &str) -> Result<(), DisplayError>;
}

/// Live sink that keeps a 16x2 LCD showing the latest readings and the time.
pub struct LcdSink<D: CharacterDisplay> {
    display: D,
    template_drawn: bool,
}

impl<D: CharacterDisplay> LcdSink<D> {
    pub fn new(display: D) -> Self {
        Self {
            display,
            template_drawn: false,
        }
    }

    /// Clears the screen and draws the labels
    pub fn draw_template(&mut self) -> Result<(), DisplayError> {
        self.display.clear()?;
        for (row, line) in TEMPLATE.iter().enumerate() {
            self.display.write_at(0, row as u8, line)?;
        }
        self.template_drawn = true;
        Ok(())
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn release(self) -> D {
        self.display
    }

    fn ensure_template(&mut self) -> Result<(), DisplayError> {
        if !self.template_drawn {
            self.draw_template()?;
        }
        Ok(())
    }

    /// Writes a measurement into its cell, rounded and blank padded
    /// param cell: where to write
    /// param value: the measurement
    fn render_value(&mut self, cell: Cell, value: f32) -> Result<(), DisplayError> {
        let text = format_value(value, cell.width);
        self.display.write_at(cell.col, cell.row, &text)
    }

    fn render_clock(&mut self, cell: Cell, value: u8) -> Result<(), DisplayError> {
        let text = pad_number(value);
        self.display.write_at(cell.col, cell.row, &text)
    }
}

impl<D: CharacterDisplay> PartialSink for LcdSink<D> {
    fn on_partial(&mut self, fields: &Fields) -> Result<(), SinkDeliveryError> {
        self.ensure_template().map_err(|_| SinkDeliveryError::Display)?;
        let cells = [
            (HUMIDITY, fields.humidity),
            (TEMPERATURE, fields.temperature),
            (PM25, fields.pm25),
            (PM10, fields.pm10),
        ];
        for (cell, value) in cells {
            if let Some(value) = value {
                self.render_value(cell, value)
                    .map_err(|_| SinkDeliveryError::Display)?;
            }
        }
        Ok(())
    }

    fn on_time(&mut self, now: &DateTimeComponents) -> Result<(), SinkDeliveryError> {
        self.ensure_template().map_err(|_| SinkDeliveryError::Display)?;
        self.render_clock(HOUR, now.hour)
            .and_then(|_| self.render_clock(MINUTE, now.minute))
            .map_err(|_| SinkDeliveryError::Display)
    }
}

/// Rounds half away from zero without libm
fn round(value: f32) -> i32 {
    if value >= 0.0 {
        (value + 0.5) as i32
    } else {
        (value - 0.5) as i32
    }
}

/// Formats a reading left aligned in `width` columns, clamping to what fits
/// param value: the reading
/// param width: cell width, 1-4
/// returns exactly `width` characters
pub fn format_value(value: f32, width: u8) -> String<4> {
    let width = width.clamp(1, 4) as u32;
    let max = 10i32.pow(width) - 1;
    let min = if width > 1 { -(10i32.pow(width - 1) - 1) } else { 0 };
    let shown = round(value).clamp(min, max);

    let mut text: String<4> = String::new();
    // Capacity is 4 and `shown` has at most `width` characters
    let _ = uwrite!(&mut text, "{}", shown);
    while text.len() < width as usize {
        let _ = text.push(' ');
    }
    text
}

/// Pads a number with a zero before it if < 10
/// NOTE: Only supports values <100
/// param num: number to be padded
/// returns: String with formatted value
fn pad_number(num: u8) -> String<2> {
    let mut padded = String::new();
    if num < 10 {
        let _ = uwrite!(&mut padded, "0{}", num);
    } else {
        let _ = uwrite!(&mut padded, "{}", num % 100);
    }
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 16x2 character grid
    struct Grid {
        cells: [[u8; COLUMNS as usize]; ROWS as usize],
        writes: usize,
        broken: bool,
    }

    impl Grid {
        fn new() -> Self {
            Self {
                cells: [[b'#'; COLUMNS as usize]; ROWS as usize],
                writes: 0,
                broken: false,
            }
        }

        fn row(&self, row: usize) -> &str {
            core::str::from_utf8(&self.cells[row]).unwrap()
        }
    }

    impl CharacterDisplay for Grid {
        fn clear(&mut self) -> Result<(), DisplayError> {
            if self.broken {
                return Err(DisplayError);
            }
            self.cells = [[b' '; COLUMNS as usize]; ROWS as usize];
            Ok(())
        }

        fn write_at(&mut self, col: u8, row: u8, text: &str) -> Result<(), DisplayError> {
            if self.broken {
                return Err(DisplayError);
            }
            self.writes += 1;
            for (i, b) in text.bytes().enumerate() {
                let col = col as usize + i;
                if col < COLUMNS as usize {
                    self.cells[row as usize][col] = b;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn template_fits_the_screen() {
        for line in TEMPLATE {
            assert_eq!(line.len(), COLUMNS as usize);
        }
    }

    #[test]
    fn renders_fields_into_their_cells() {
        let mut lcd = LcdSink::new(Grid::new());
        lcd.on_time(&DateTimeComponents::new(2024, 1, 1, 9, 5, 0)).unwrap();
        lcd.on_partial(&Fields {
            temperature: Some(21.4),
            humidity: Some(55.0),
            ..Default::default()
        })
        .unwrap();
        lcd.on_partial(&Fields {
            pm25: Some(12.5),
            pm10: Some(118.2),
            ..Default::default()
        })
        .unwrap();

        let grid = lcd.display();
        assert_eq!(grid.row(0), "09:05 H55% T:21C");
        assert_eq!(grid.row(1), "P2.5:13  P10:118");
    }

    #[test]
    fn shorter_value_blanks_the_old_digits() {
        let mut lcd = LcdSink::new(Grid::new());
        lcd.on_partial(&Fields {
            pm25: Some(250.0),
            ..Default::default()
        })
        .unwrap();
        lcd.on_partial(&Fields {
            pm25: Some(7.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(&lcd.display().row(1)[5..8], "7  ");
    }

    #[test]
    fn only_present_fields_are_written() {
        let mut lcd = LcdSink::new(Grid::new());
        lcd.draw_template().unwrap();
        let after_template = lcd.display().writes;
        lcd.on_partial(&Fields {
            pm10: Some(3.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(lcd.display().writes, after_template + 1);
    }

    #[test]
    fn clamps_values_that_do_not_fit() {
        assert_eq!(format_value(1234.0, 3).as_str(), "999");
        assert_eq!(format_value(-12.0, 2).as_str(), "-9");
        assert_eq!(format_value(-0.4, 2).as_str(), "0 ");
        assert_eq!(format_value(99.5, 2).as_str(), "99");
    }

    #[test]
    fn display_failure_maps_to_delivery_error() {
        let mut grid = Grid::new();
        grid.broken = true;
        let mut lcd = LcdSink::new(grid);
        assert_eq!(
            lcd.on_partial(&Fields {
                pm10: Some(3.0),
                ..Default::default()
            }),
            Err(SinkDeliveryError::Display)
        );
    }
}
