//! # 内存拷贝接口
//!
//! 文件内容在块缓冲与调用者的内存之间搬运。
//! 调用者的内存可能在内核里，也可能在某个任务的地址空间里，
//! 后者通过 [`UserSpace`] 读写。

use crate::BLOCK_SIZE;

/// 任务地址空间的拷贝原语，由内存管理模块实现
pub trait UserSpace: Send + Sync {
    /// 把 `src` 拷贝到地址空间中的 `dst`
    fn copy_out(&self, dst: usize, src: &[u8]);

    /// 从地址空间中的 `src` 拷贝到 `dst`
    fn copy_in(&self, dst: &mut [u8], src: usize);
}

/// 读操作的目的缓冲
pub enum DstBuf<'a> {
    Kernel(&'a mut [u8]),
    User {
        space: &'a dyn UserSpace,
        addr: usize,
        len: usize,
    },
}

/// 写操作的源缓冲
pub enum SrcBuf<'a> {
    Kernel(&'a [u8]),
    User {
        space: &'a dyn UserSpace,
        addr: usize,
        len: usize,
    },
}

impl DstBuf<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Kernel(buf) => buf.len(),
            Self::User { len, .. } => *len,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 把 `src` 放到缓冲内 `offset` 处
    pub fn copy_from(&mut self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= self.len());
        match self {
            Self::Kernel(buf) => buf[offset..offset + src.len()].copy_from_slice(src),
            Self::User { space, addr, .. } => space.copy_out(*addr + offset, src),
        }
    }

    /// 缓冲内 `[offset, offset + len)` 清零
    pub fn fill_zero(&mut self, offset: usize, len: usize) {
        const ZEROS: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

        let mut done = 0;
        while done < len {
            let n = (len - done).min(BLOCK_SIZE);
            self.copy_from(offset + done, &ZEROS[..n]);
            done += n;
        }
    }
}

impl SrcBuf<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Kernel(buf) => buf.len(),
            Self::User { len, .. } => *len,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 从缓冲内 `offset` 处取出 `dst.len()` 个字节
    pub fn copy_to(&self, offset: usize, dst: &mut [u8]) {
        assert!(offset + dst.len() <= self.len());
        match self {
            Self::Kernel(buf) => dst.copy_from_slice(&buf[offset..offset + dst.len()]),
            Self::User { space, addr, .. } => space.copy_in(dst, *addr + offset),
        }
    }
}

impl<'a> From<&'a mut [u8]> for DstBuf<'a> {
    #[inline]
    fn from(buf: &'a mut [u8]) -> Self {
        Self::Kernel(buf)
    }
}

impl<'a, const N: usize> From<&'a mut [u8; N]> for DstBuf<'a> {
    #[inline]
    fn from(buf: &'a mut [u8; N]) -> Self {
        Self::Kernel(buf)
    }
}

impl<'a> From<&'a [u8]> for SrcBuf<'a> {
    #[inline]
    fn from(buf: &'a [u8]) -> Self {
        Self::Kernel(buf)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for SrcBuf<'a> {
    #[inline]
    fn from(buf: &'a [u8; N]) -> Self {
        Self::Kernel(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// 以一段向量模拟任务地址空间
    struct FlatSpace(Mutex<Vec<u8>>);

    impl UserSpace for FlatSpace {
        fn copy_out(&self, dst: usize, src: &[u8]) {
            self.0.lock().unwrap()[dst..dst + src.len()].copy_from_slice(src);
        }

        fn copy_in(&self, dst: &mut [u8], src: usize) {
            dst.copy_from_slice(&self.0.lock().unwrap()[src..src + dst.len()]);
        }
    }

    #[test]
    fn user_buffers_go_through_space() {
        let space = FlatSpace(Mutex::new(vec![7; 2048]));

        let mut dst = DstBuf::User {
            space: &space,
            addr: 100,
            len: 1500,
        };
        dst.copy_from(0, b"abc");
        dst.fill_zero(3, 1000);
        let memory = space.0.lock().unwrap().clone();
        assert_eq!(&memory[100..103], b"abc");
        assert!(memory[103..1103].iter().all(|&b| b == 0));
        assert_eq!(memory[1103], 7);

        let src = SrcBuf::User {
            space: &space,
            addr: 100,
            len: 3,
        };
        let mut out = [0; 3];
        src.copy_to(0, &mut out);
        assert_eq!(&out, b"abc");
    }
}
