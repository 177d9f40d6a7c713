use super::SheetSink;
use crate::error::ExportError;
use crate::models::CellValue;
use bigdecimal::ToPrimitive;
use chrono::{Datelike, Timelike};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet, XlsxError};
use std::path::{Path, PathBuf};

/// [`SheetSink`] writing an `.xlsx` workbook with `rust_xlsxwriter`.
///
/// Sheets run in constant-memory mode: each finished row is flushed to a
/// temporary file, so rows must arrive in increasing order and memory stays
/// at one row per sheet whatever the result size. The workbook is assembled
/// at [`SheetSink::save`].
pub struct XlsxSink {
    workbook: Workbook,
    path: PathBuf,
    current: Option<usize>,
    formats: CellFormats,
}

struct CellFormats {
    header: Format,
    date: Format,
    datetime: Format,
}

impl XlsxSink {
    pub fn new(path: impl AsRef<Path>, date_format: &str, datetime_format: &str) -> Self {
        Self {
            workbook: Workbook::new(),
            path: path.as_ref().to_path_buf(),
            current: None,
            formats: CellFormats {
                header: Format::new().set_bold(),
                date: Format::new().set_num_format(date_format),
                datetime: Format::new().set_num_format(datetime_format),
            },
        }
    }

    fn sheet(&mut self) -> Result<&mut Worksheet, ExportError> {
        let index = self.current.ok_or(ExportError::NoSheet)?;
        Ok(self.workbook.worksheet_from_index(index)?)
    }
}

impl SheetSink for XlsxSink {
    fn add_sheet(&mut self, name: &str) -> Result<(), ExportError> {
        let worksheet = self.workbook.add_worksheet_with_constant_memory();
        worksheet.set_name(name)?;
        self.current = Some(self.current.map_or(0, |i| i + 1));
        Ok(())
    }

    fn write_header(&mut self, columns: &[String]) -> Result<(), ExportError> {
        let index = self.current.ok_or(ExportError::NoSheet)?;
        let worksheet = self.workbook.worksheet_from_index(index)?;
        for (col, name) in columns.iter().enumerate() {
            worksheet.write_string_with_format(0, column_number(col)?, name, &self.formats.header)?;
        }
        if !columns.is_empty() {
            worksheet.set_freeze_panes(1, 0)?;
        }
        Ok(())
    }

    fn write_row(&mut self, row: u32, values: &[CellValue]) -> Result<(), ExportError> {
        let index = self.current.ok_or(ExportError::NoSheet)?;
        let worksheet = self.workbook.worksheet_from_index(index)?;
        for (col, value) in values.iter().enumerate() {
            write_cell(worksheet, row, column_number(col)?, value, &self.formats)?;
        }
        Ok(())
    }

    fn set_column_widths(&mut self, widths: &[usize]) -> Result<(), ExportError> {
        let worksheet = self.sheet()?;
        for (col, width) in widths.iter().enumerate() {
            worksheet.set_column_width(column_number(col)?, *width as f64)?;
        }
        Ok(())
    }

    fn save(&mut self) -> Result<(), ExportError> {
        self.workbook.save(&self.path)?;
        Ok(())
    }
}

fn column_number(index: usize) -> Result<u16, ExportError> {
    u16::try_from(index).map_err(|_| ExportError::TooManyColumns(index + 1))
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    formats: &CellFormats,
) -> Result<(), XlsxError> {
    match value {
        CellValue::Null => {}
        CellValue::Text(text) => {
            worksheet.write_string(row, col, text)?;
        }
        CellValue::Integer(n) => {
            worksheet.write_number(row, col, *n as f64)?;
        }
        CellValue::Decimal(d) => match d.to_f64() {
            Some(number) => {
                worksheet.write_number(row, col, number)?;
            }
            None => {
                worksheet.write_string(row, col, value.render())?;
            }
        },
        CellValue::Float(f) => {
            worksheet.write_number(row, col, *f)?;
        }
        CellValue::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        CellValue::Date(date) => {
            match excel_date(date.year(), date.month(), date.day()) {
                Some(dt) => worksheet.write_datetime_with_format(row, col, &dt, &formats.date)?,
                // outside the Excel epoch
                None => worksheet.write_string(row, col, value.render())?,
            };
        }
        CellValue::DateTime(ts) => {
            let converted = excel_date(ts.year(), ts.month(), ts.day()).and_then(|dt| {
                dt.and_hms(ts.hour() as u16, ts.minute() as u8, f64::from(ts.second()))
                    .ok()
            });
            match converted {
                Some(dt) => worksheet.write_datetime_with_format(row, col, &dt, &formats.datetime)?,
                None => worksheet.write_string(row, col, value.render())?,
            };
        }
    }
    Ok(())
}

fn excel_date(year: i32, month: u32, day: u32) -> Option<ExcelDateTime> {
    let year = u16::try_from(year).ok()?;
    ExcelDateTime::from_ymd(year, month as u8, day as u8).ok()
}
