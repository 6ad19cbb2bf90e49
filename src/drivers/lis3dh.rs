use embassy_stm32::i2c::{Error, I2c, Instance, RxDma, TxDma};

/// SA0 pulled high on the sensor board.
const ADDR: u8 = 0x19;

const REG_WHO_AM_I: u8 = 0x0F;
const REG_CTRL1: u8 = 0x20;
const REG_CTRL3: u8 = 0x22;
const REG_CTRL4: u8 = 0x23;
const REG_CTRL5: u8 = 0x24;
const REG_INT1_CFG: u8 = 0x30;
const REG_INT1_SRC: u8 = 0x31;
const REG_INT1_THS: u8 = 0x32;
const REG_INT1_DURATION: u8 = 0x33;

const WHO_AM_I: u8 = 0x33;

/// 10 Hz, low power, X/Y/Z enabled
const CTRL1_10HZ_LP_XYZ: u8 = 0x2F;
/// IA1 routed to INT1
const CTRL3_I1_IA1: u8 = 0x40;
/// ±2 g
const CTRL4_FS_2G: u8 = 0x00;
/// INT1 stays latched until INT1_SRC is read
const CTRL5_LIR_INT1: u8 = 0x08;
/// OR of X/Y/Z high events
const INT1_CFG_XYZ_HIGH: u8 = 0x2A;
/// 16 mg/LSB at ±2 g
const MOTION_THRESHOLD: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Lis3dhError {
    Bus,
    WrongId(u8),
}

impl From<Error> for Lis3dhError {
    fn from(_: Error) -> Self {
        Lis3dhError::Bus
    }
}

/// Wake-on-motion accelerometer. Only the interrupt path is used, no samples.
pub struct Lis3dh;

impl Lis3dh {
    pub fn init<T: Instance, Tx: TxDma<T>, Rx: RxDma<T>>(
        i2c: &mut I2c<'_, T, Tx, Rx>,
    ) -> Result<Self, Lis3dhError> {
        let id = read_reg(i2c, REG_WHO_AM_I)?;
        if id != WHO_AM_I {
            return Err(Lis3dhError::WrongId(id));
        }
        write_reg(i2c, REG_CTRL1, CTRL1_10HZ_LP_XYZ)?;
        write_reg(i2c, REG_CTRL4, CTRL4_FS_2G)?;
        write_reg(i2c, REG_CTRL5, CTRL5_LIR_INT1)?;
        write_reg(i2c, REG_INT1_THS, MOTION_THRESHOLD)?;
        write_reg(i2c, REG_INT1_DURATION, 0)?;
        write_reg(i2c, REG_INT1_CFG, INT1_CFG_XYZ_HIGH)?;
        write_reg(i2c, REG_CTRL3, CTRL3_I1_IA1)?;
        // Drop anything latched during configuration
        read_reg(i2c, REG_INT1_SRC)?;
        Ok(Self)
    }

    /// Reading INT1_SRC releases the latched interrupt line.
    pub fn clear_latch<T: Instance, Tx: TxDma<T>, Rx: RxDma<T>>(
        &self,
        i2c: &mut I2c<'_, T, Tx, Rx>,
    ) -> Result<u8, Lis3dhError> {
        read_reg(i2c, REG_INT1_SRC)
    }
}

fn read_reg<T: Instance, Tx: TxDma<T>, Rx: RxDma<T>>(
    i2c: &mut I2c<'_, T, Tx, Rx>,
    reg: u8,
) -> Result<u8, Lis3dhError> {
    let mut buf = [0u8; 1];
    i2c.blocking_write_read(ADDR, &[reg], &mut buf)?;
    Ok(buf[0])
}

fn write_reg<T: Instance, Tx: TxDma<T>, Rx: RxDma<T>>(
    i2c: &mut I2c<'_, T, Tx, Rx>,
    reg: u8,
    val: u8,
) -> Result<(), Lis3dhError> {
    i2c.blocking_write(ADDR, &[reg, val])?;
    Ok(())
}
