//! 字节码定义
//!
//! 每条指令 = 1 字节操作码 + 0/1/2 字节操作数。两字节操作数一律大端。
//! `operand_size()` 是唯一的宽度表，发射器、VM 与反汇编器都查它。

pub mod code;

/// 操作码定义
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ===== 控制 (0x00-0x0F) =====
    Return = 0x00,
    Call,        // u8 参数个数
    TailCall,    // u8 参数个数
    Jump,        // u16 前向偏移（相对本条指令起始）
    JumpIfFalse, // u16 前向偏移，弹出条件

    // ===== 常量与栈 (0x10-0x1F) =====
    Constant = 0x10, // u8 常量索引
    ConstantWide,    // u16 常量索引
    PushNone,
    Pop,

    // ===== 局部变量 (0x20-0x2F) =====
    LoadLocal = 0x20,
    LoadLocalWide,
    StoreLocal,
    StoreLocalWide,

    // ===== 捕获环境（按名字） (0x30-0x3F) =====
    LoadDynamic = 0x30,
    LoadDynamicWide,
    StoreDynamic,
    StoreDynamicWide,

    // ===== 全局变量 (0x40-0x4F) =====
    LoadGlobal = 0x40,
    LoadGlobalWide,
    StoreGlobal,
    StoreGlobalWide,

    // ===== 函数 (0x50-0x5F) =====
    Lambda = 0x50, // u8 常量索引（Code）
    LambdaWide,

    // ===== 数据构造 (0x60-0x6F) =====
    BuildList = 0x60, // u8 元素个数
    BuildTuple,       // u8 元素个数
    BuildRecord,      // u8 字段个数，栈上为 (符号, 值) 对
    GetField,         // u8 常量索引（符号）
    GetFieldWide,

    // ===== 效应 (0x70-0x7F) =====
    MakeHandler = 0x70, // u8 子句个数，栈上为 (效应类型, 子句) 对
    Handle,             // 弹出 thunk 与 handler，安装后调用 thunk
}

impl OpCode {
    /// 获取操作码名称
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Return => "RETURN",
            OpCode::Call => "CALL",
            OpCode::TailCall => "TAIL_CALL",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::Constant => "CONSTANT",
            OpCode::ConstantWide => "CONSTANT_WIDE",
            OpCode::PushNone => "PUSH_NONE",
            OpCode::Pop => "POP",
            OpCode::LoadLocal => "LOAD_LOCAL",
            OpCode::LoadLocalWide => "LOAD_LOCAL_WIDE",
            OpCode::StoreLocal => "STORE_LOCAL",
            OpCode::StoreLocalWide => "STORE_LOCAL_WIDE",
            OpCode::LoadDynamic => "LOAD_DYNAMIC",
            OpCode::LoadDynamicWide => "LOAD_DYNAMIC_WIDE",
            OpCode::StoreDynamic => "STORE_DYNAMIC",
            OpCode::StoreDynamicWide => "STORE_DYNAMIC_WIDE",
            OpCode::LoadGlobal => "LOAD_GLOBAL",
            OpCode::LoadGlobalWide => "LOAD_GLOBAL_WIDE",
            OpCode::StoreGlobal => "STORE_GLOBAL",
            OpCode::StoreGlobalWide => "STORE_GLOBAL_WIDE",
            OpCode::Lambda => "LAMBDA",
            OpCode::LambdaWide => "LAMBDA_WIDE",
            OpCode::BuildList => "BUILD_LIST",
            OpCode::BuildTuple => "BUILD_TUPLE",
            OpCode::BuildRecord => "BUILD_RECORD",
            OpCode::GetField => "GET_FIELD",
            OpCode::GetFieldWide => "GET_FIELD_WIDE",
            OpCode::MakeHandler => "MAKE_HANDLER",
            OpCode::Handle => "HANDLE",
        }
    }

    /// 操作数大小 (bytes)
    pub fn operand_size(&self) -> usize {
        match self {
            // 无操作数
            OpCode::Return | OpCode::PushNone | OpCode::Pop | OpCode::Handle => 0,

            // u8 操作数
            OpCode::Call
            | OpCode::TailCall
            | OpCode::Constant
            | OpCode::LoadLocal
            | OpCode::StoreLocal
            | OpCode::LoadDynamic
            | OpCode::StoreDynamic
            | OpCode::LoadGlobal
            | OpCode::StoreGlobal
            | OpCode::Lambda
            | OpCode::BuildList
            | OpCode::BuildTuple
            | OpCode::BuildRecord
            | OpCode::GetField
            | OpCode::MakeHandler => 1,

            // u16 操作数（大端）
            OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::ConstantWide
            | OpCode::LoadLocalWide
            | OpCode::StoreLocalWide
            | OpCode::LoadDynamicWide
            | OpCode::StoreDynamicWide
            | OpCode::LoadGlobalWide
            | OpCode::StoreGlobalWide
            | OpCode::LambdaWide
            | OpCode::GetFieldWide => 2,
        }
    }

    /// 同一操作的宽操作数版本（没有宽版本的返回 None）
    pub fn wide(&self) -> Option<OpCode> {
        match self {
            OpCode::Constant => Some(OpCode::ConstantWide),
            OpCode::LoadLocal => Some(OpCode::LoadLocalWide),
            OpCode::StoreLocal => Some(OpCode::StoreLocalWide),
            OpCode::LoadDynamic => Some(OpCode::LoadDynamicWide),
            OpCode::StoreDynamic => Some(OpCode::StoreDynamicWide),
            OpCode::LoadGlobal => Some(OpCode::LoadGlobalWide),
            OpCode::StoreGlobal => Some(OpCode::StoreGlobalWide),
            OpCode::Lambda => Some(OpCode::LambdaWide),
            OpCode::GetField => Some(OpCode::GetFieldWide),
            _ => None,
        }
    }

    /// 操作数是否为常量池索引
    pub fn has_constant_operand(&self) -> bool {
        matches!(
            self,
            OpCode::Constant
                | OpCode::ConstantWide
                | OpCode::LoadDynamic
                | OpCode::LoadDynamicWide
                | OpCode::StoreDynamic
                | OpCode::StoreDynamicWide
                | OpCode::LoadGlobal
                | OpCode::LoadGlobalWide
                | OpCode::StoreGlobal
                | OpCode::StoreGlobalWide
                | OpCode::Lambda
                | OpCode::LambdaWide
                | OpCode::GetField
                | OpCode::GetFieldWide
        )
    }
}

/// 无法识别的操作码字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpCode(pub u8);

impl std::fmt::Display for InvalidOpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid opcode 0x{:02x}", self.0)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = InvalidOpCode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let op = match byte {
            0x00 => OpCode::Return,
            0x01 => OpCode::Call,
            0x02 => OpCode::TailCall,
            0x03 => OpCode::Jump,
            0x04 => OpCode::JumpIfFalse,
            0x10 => OpCode::Constant,
            0x11 => OpCode::ConstantWide,
            0x12 => OpCode::PushNone,
            0x13 => OpCode::Pop,
            0x20 => OpCode::LoadLocal,
            0x21 => OpCode::LoadLocalWide,
            0x22 => OpCode::StoreLocal,
            0x23 => OpCode::StoreLocalWide,
            0x30 => OpCode::LoadDynamic,
            0x31 => OpCode::LoadDynamicWide,
            0x32 => OpCode::StoreDynamic,
            0x33 => OpCode::StoreDynamicWide,
            0x40 => OpCode::LoadGlobal,
            0x41 => OpCode::LoadGlobalWide,
            0x42 => OpCode::StoreGlobal,
            0x43 => OpCode::StoreGlobalWide,
            0x50 => OpCode::Lambda,
            0x51 => OpCode::LambdaWide,
            0x60 => OpCode::BuildList,
            0x61 => OpCode::BuildTuple,
            0x62 => OpCode::BuildRecord,
            0x63 => OpCode::GetField,
            0x64 => OpCode::GetFieldWide,
            0x70 => OpCode::MakeHandler,
            0x71 => OpCode::Handle,
            other => return Err(InvalidOpCode(other)),
        };
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_name() {
        assert_eq!(OpCode::Return.name(), "RETURN");
        assert_eq!(OpCode::JumpIfFalse.name(), "JUMP_IF_FALSE");
        assert_eq!(OpCode::LoadDynamicWide.name(), "LOAD_DYNAMIC_WIDE");
    }

    #[test]
    fn test_operand_size() {
        assert_eq!(OpCode::Return.operand_size(), 0);
        assert_eq!(OpCode::Constant.operand_size(), 1);
        assert_eq!(OpCode::ConstantWide.operand_size(), 2);
        assert_eq!(OpCode::Jump.operand_size(), 2);
    }

    #[test]
    fn test_try_from_u8_round_trips() {
        for byte in 0u8..=255 {
            if let Ok(op) = OpCode::try_from(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(OpCode::try_from(0x10), Ok(OpCode::Constant));
        assert_eq!(OpCode::try_from(0xFF), Err(InvalidOpCode(0xFF)));
    }

    #[test]
    fn test_wide_variants_take_two_bytes() {
        for op in [
            OpCode::Constant,
            OpCode::LoadLocal,
            OpCode::StoreLocal,
            OpCode::LoadDynamic,
            OpCode::StoreDynamic,
            OpCode::LoadGlobal,
            OpCode::StoreGlobal,
            OpCode::Lambda,
            OpCode::GetField,
        ] {
            let wide = op.wide().unwrap();
            assert_eq!(op.operand_size(), 1);
            assert_eq!(wide.operand_size(), 2);
        }
        assert_eq!(OpCode::Call.wide(), None);
    }
}
